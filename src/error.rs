pub type LoomResult<T> = Result<T, LoomError>;

#[derive(thiserror::Error, Debug)]
pub enum LoomError {
    #[error("topology error: {0}")]
    Topology(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("schedule error: {0}")]
    Schedule(String),

    #[error("output error: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoomError {
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }
}
