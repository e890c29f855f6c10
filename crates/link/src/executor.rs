//! Command executor seam.

use tl_protocol::KeyCode;

use crate::types::ExecError;

/// Turns a resolved key code into a real device action.
///
/// Calls are fire-and-forget from the link's point of view: the router
/// spawns each execution and sends its `confirm` without waiting for it.
///
/// # Example
///
/// ```rust,no_run
/// use tl_link::{CommandExecutor, ExecError, KeyCode};
///
/// struct Print;
///
/// #[async_trait::async_trait]
/// impl CommandExecutor for Print {
///     async fn execute(&self, code: KeyCode) -> Result<(), ExecError> {
///         println!("key {code}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    async fn execute(&self, code: KeyCode) -> Result<(), ExecError>;

    /// Short label for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}
