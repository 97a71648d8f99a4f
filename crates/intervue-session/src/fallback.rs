//! Built-in questions served when the Question Service cannot deliver.

use intervue_core::model::{Difficulty, Question, SessionSetup};
use intervue_core::QuestionId;

struct Canned {
    text: &'static str,
    topic: &'static str,
}

const BY_STACK: &[(&str, Canned)] = &[
    (
        "javascript",
        Canned {
            text: "Explain the event loop in JavaScript and how it handles asynchronous operations.",
            topic: "JavaScript Runtime",
        },
    ),
    (
        "react",
        Canned {
            text: "What is the Virtual DOM and how does React use it to optimize performance?",
            topic: "React Fundamentals",
        },
    ),
    (
        "python",
        Canned {
            text: "Explain the difference between lists and tuples in Python. When would you use each?",
            topic: "Python Basics",
        },
    ),
];

const HR: Canned = Canned {
    text: "Tell me about a challenging project you worked on and how you overcame obstacles.",
    topic: "Problem Solving",
};

const GENERAL: &[Canned] = &[
    Canned {
        text: "Walk me through the architecture of your project and explain your key design decisions.",
        topic: "Architecture",
    },
    Canned {
        text: "Describe a technical decision you made that you would revisit today, and why.",
        topic: "Decision Making",
    },
    Canned {
        text: "How would you scale a service that suddenly receives ten times its usual traffic?",
        topic: "Scalability",
    },
    Canned {
        text: "What steps do you take to keep user data secure in the systems you build?",
        topic: "Security",
    },
    Canned {
        text: "How do you approach debugging a problem you cannot reproduce locally?",
        topic: "Debugging",
    },
];

/// Question for slot `index` of a session set up with `setup`.
///
/// The first slot prefers a stack- or type-specific question; the rest rotate
/// through general questions so consecutive fallbacks do not repeat.
pub fn fallback_question(setup: &SessionSetup, index: u32) -> Question {
    let specific = if index == 0 { first_choice(setup) } else { None };
    let canned = specific.unwrap_or(&GENERAL[index as usize % GENERAL.len()]);

    Question {
        id: QuestionId::from_raw(format!("fallback_{}", index + 1)),
        text: canned.text.to_string(),
        topic: canned.topic.to_string(),
        difficulty: Difficulty::Medium,
    }
}

fn first_choice(setup: &SessionSetup) -> Option<&'static Canned> {
    match setup.interview_type.as_deref() {
        Some("hr") => Some(&HR),
        Some("project") => None,
        _ => setup.tech_stack.iter().find_map(|tech| {
            let tech = tech.trim().to_ascii_lowercase();
            BY_STACK
                .iter()
                .find(|(name, _)| *name == tech)
                .map(|(_, canned)| canned)
        }),
    }
}
