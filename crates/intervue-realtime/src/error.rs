use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("reconnection abandoned after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChannelError {
    /// Whether the channel will keep trying on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exhaustion_is_terminal() {
        assert!(ChannelError::Exhausted { attempts: 5 }.is_terminal());
        assert!(!ChannelError::Connect("refused".into()).is_terminal());
        assert_eq!(
            ChannelError::Exhausted { attempts: 5 }.to_string(),
            "reconnection abandoned after 5 attempts"
        );
    }
}
