//! # intervue
//!
//! Terminal front end for the interview session engine.

#![deny(unsafe_code)]

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use intervue_client::{HttpConfig, HttpQuestionService, HttpReportService, MockQuestionService, MockReportService};
use intervue_core::model::{SessionSetup, SessionStatus};
use intervue_core::service::{QuestionService, ReportService};
use intervue_realtime::{ChannelConfig, RealtimeChannel, WsTransport};
use intervue_session::{SessionConfig, SessionController, SessionDeps, SessionHandle, SessionOutcome, SessionSnapshot};
use intervue_settings::InterviewSettings;
use intervue_telemetry::{init_telemetry, TelemetryConfig};

use crate::terminal::{AlwaysPresent, HeadlessDisplay, PrintedSpeech, TerminalMedia};

/// Timed, integrity-monitored interview sessions.
#[derive(Parser, Debug)]
#[command(name = "intervue", version, about = "Timed, integrity-monitored interview sessions")]
struct Cli {
    /// Settings file (defaults to ~/.intervue/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an interview in this terminal.
    Run(RunArgs),
    /// Print the effective settings as JSON.
    Settings,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Role being interviewed for.
    #[arg(long)]
    role: Option<String>,

    /// Comma-separated technologies, e.g. `rust,postgres`.
    #[arg(long = "stack", value_delimiter = ',')]
    tech_stack: Vec<String>,

    /// Interview type: technical, hr, project.
    #[arg(long = "type")]
    interview_type: Option<String>,

    #[arg(long)]
    experience: Option<String>,

    /// Interviewer persona.
    #[arg(long)]
    persona: Option<String>,

    /// Number of questions (overrides settings).
    #[arg(long)]
    questions: Option<u32>,

    /// Seconds per question (overrides settings).
    #[arg(long)]
    budget: Option<u32>,

    /// Use scripted services instead of the backend.
    #[arg(long)]
    offline: bool,
}

impl RunArgs {
    fn setup(&self) -> SessionSetup {
        SessionSetup {
            interview_type: self.interview_type.clone(),
            role: self.role.clone(),
            tech_stack: self.tech_stack.clone(),
            experience: self.experience.clone(),
            persona: self.persona.clone(),
            cv_data: None,
            project_data: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => intervue_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => intervue_settings::load_settings().context("Failed to load settings")?,
    };
    let telemetry = init_telemetry(TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ));
    debug!(filter = telemetry.filter(), "telemetry ready");

    match cli.command {
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Run(args) => run(settings, args).await,
    }
}

fn build_deps(settings: &InterviewSettings, offline: bool) -> Result<SessionDeps> {
    let questions: Arc<dyn QuestionService>;
    let reports: Arc<dyn ReportService>;
    let mut channel = None;

    if offline {
        info!("offline mode, using scripted services");
        questions = Arc::new(MockQuestionService::new());
        reports = Arc::new(MockReportService::new());
    } else {
        let http = HttpConfig::from_settings(settings);
        questions = Arc::new(
            HttpQuestionService::new(http.clone()).context("Failed to build question client")?,
        );
        reports = Arc::new(HttpReportService::new(http).context("Failed to build report client")?);
        if settings.channel.enabled {
            let transport = WsTransport::new(settings.api.ws_url.clone(), settings.channel.send_queue);
            channel = Some(Arc::new(RealtimeChannel::new(
                Arc::new(transport),
                ChannelConfig::from_settings(settings),
            )));
        }
    }

    Ok(SessionDeps {
        questions,
        reports,
        media: Arc::new(TerminalMedia),
        speech: Some(Arc::new(PrintedSpeech)),
        presence: Arc::new(AlwaysPresent),
        display: Arc::new(HeadlessDisplay),
        channel,
    })
}

async fn run(settings: InterviewSettings, args: RunArgs) -> Result<()> {
    let mut config = SessionConfig::from_settings(&settings);
    if let Some(n) = args.questions {
        config.total_questions = n;
    }
    if let Some(secs) = args.budget {
        config.per_question_budget_secs = secs;
    }
    let print_questions = !config.speak_questions;

    let deps = build_deps(&settings, args.offline)?;
    let (controller, handle) = SessionController::new(config, deps);
    let mut session = tokio::spawn(controller.run());
    let render = tokio::spawn(render(handle.watch(), print_questions));

    println!("Commands: /submit /pause /resume /record /stop /abort. Other lines are your answer.");
    if let Err(e) = handle.start(args.setup()).await {
        handle.abort();
        let _ = session.await;
        render.abort();
        return Err(e).context("Could not start interview");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let outcome = loop {
        tokio::select! {
            outcome = &mut session => break outcome.context("session task panicked")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, aborting session");
                handle.abort();
            }
            line = lines.next_line(), if stdin_open => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if let Err(e) = dispatch(&handle, line.trim()).await {
                        eprintln!("  ! {e}");
                    }
                }
                None => {
                    stdin_open = false;
                    handle.abort();
                }
            },
        }
    };
    render.abort();

    print_outcome(&outcome)?;
    if outcome.status == SessionStatus::Failed {
        match outcome.error {
            Some(e) => bail!("interview failed: {e}"),
            None => bail!("interview failed"),
        }
    }
    Ok(())
}

async fn dispatch(handle: &SessionHandle, line: &str) -> Result<()> {
    match line {
        "/submit" => {
            let Some(question) = handle.snapshot().current_question else {
                bail!("no question is active");
            };
            handle.submit(question.id).await?;
        }
        "/pause" => handle.pause().await?,
        "/resume" => handle.resume().await?,
        "/record" => handle.start_recording().await?,
        "/stop" => handle.stop_recording().await?,
        "/abort" => handle.abort(),
        "" => {}
        text => {
            // the controller clears the buffer when a new question arrives
            let mut answer = handle.snapshot().answer_buffer;
            if !answer.is_empty() {
                answer.push('\n');
            }
            answer.push_str(text);
            handle.update_answer(answer).await?;
        }
    }
    Ok(())
}

async fn render(mut snapshots: watch::Receiver<SessionSnapshot>, print_questions: bool) {
    let mut shown_question = None;
    let mut shown_status = None;
    let mut shown_violations = 0;
    let mut announced = None;
    loop {
        {
            let snap = snapshots.borrow_and_update();
            if shown_status != Some(snap.status) {
                shown_status = Some(snap.status);
                println!("[{}]", snap.status);
            }
            if let Some(question) = &snap.current_question {
                if shown_question.as_ref() != Some(&question.id) {
                    shown_question = Some(question.id.clone());
                    println!(
                        "Question {}/{} ({}, {:?}), {}s",
                        snap.question_index + 1,
                        snap.total_questions,
                        question.topic,
                        question.difficulty,
                        snap.remaining_secs
                    );
                    if print_questions {
                        println!("\n  {}\n", question.text);
                    }
                }
            }
            if snap.status == SessionStatus::Answering
                && snap.remaining_secs > 0
                && snap.remaining_secs % 30 == 0
                && !snap.paused
                && announced != Some(snap.remaining_secs)
            {
                announced = Some(snap.remaining_secs);
                println!("  {}s left", snap.remaining_secs);
            }
            if snap.violations > shown_violations {
                shown_violations = snap.violations;
                println!("  integrity flag #{shown_violations}");
            }
        }
        if snapshots.changed().await.is_err() {
            return;
        }
    }
}

fn print_outcome(outcome: &SessionOutcome) -> Result<()> {
    println!(
        "\nInterview {}: {} answers, {} integrity flags",
        outcome.status,
        outcome.answers.len(),
        outcome.integrity.total
    );
    for warning in &outcome.warnings {
        println!("  note: {warning}");
    }
    if let Some(report) = &outcome.report {
        println!("{}", serde_json::to_string_pretty(&report.body)?);
    }
    Ok(())
}
