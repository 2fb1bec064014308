#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- fail-fast guards ------------------------------------------
    #[error("no active debug session")]
    NoActiveSession,
    #[error("the debug adapter does not support `{0}` requests")]
    UnsupportedAdapter(&'static str),
    #[error("a disassembly request is already in flight")]
    OperationInProgress,
    #[error("the application is running")]
    TargetRunning,

    // --------------------------------- request failures ------------------------------------------
    #[error("expression evaluation failed: {0}")]
    Expression(String),
    #[error("instruction window is not aligned to the requested address")]
    AddressAlignment,
    #[error("debug adapter request failed: {0}")]
    Adapter(anyhow::Error),
}

impl Error {
    /// Return a hint to an interface - show this error to the user or swallow it.
    ///
    /// A request rejected because another one is still in flight is not an
    /// error from the user's point of view, the view simply keeps its
    /// current content.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Error::OperationInProgress)
    }
}
