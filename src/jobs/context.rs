use tokio_util::sync::CancellationToken;

/// Context provided to a job for one execution.
///
/// The dispatcher hands every job a child of its shutdown token, so
/// cancelling the dispatcher reaches every running job while a job can
/// never cancel its siblings.
#[derive(Clone, Debug, Default)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs check this before every external call and return
    /// `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
