//! Operator console actions over the log artifact.

use crate::application::controller::CaptureController;
use crate::error::StoreError;

/// An operator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Show,
    Clear,
    TriggerTest,
    ToggleDisabled,
}

/// What the console displays after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleView {
    /// Confirmation of the action, if it changed anything
    pub status: Option<String>,
    /// Full artifact content
    pub contents: String,
    pub disabled: bool,
    /// Label of the enable/disable control
    pub toggle_label: &'static str,
}

impl CaptureController {
    /// Perform an operator action and describe the resulting state.
    ///
    /// # Errors
    /// Propagates store failures; the console shows them instead of the log.
    pub fn operator_action(&self, action: OperatorAction) -> Result<ConsoleView, StoreError> {
        let status = match action {
            OperatorAction::Show => None,
            OperatorAction::Clear => {
                self.clear_log()?;
                Some("All errors have been cleared.")
            }
            OperatorAction::TriggerTest => {
                self.trigger_test_error();
                Some("The test error has been triggered.")
            }
            OperatorAction::ToggleDisabled => Some(if self.toggle_disabled()? {
                "Error reporting has been disabled."
            } else {
                "Error reporting has been enabled."
            }),
        };

        let disabled = self.is_disabled()?;
        let contents = String::from_utf8_lossy(&self.log_contents()?).into_owned();

        Ok(ConsoleView {
            status: status.map(str::to_string),
            contents,
            disabled,
            toggle_label: if disabled {
                "Enable reporting"
            } else {
                "Disable reporting"
            },
        })
    }
}
