//! Parameters describing user-interaction flows driven by authentication
//! plugins.

use serde::{Deserialize, Serialize};

/// Operation a user-interaction flow is authorising.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum InteractionOperation {
    /// Creating a custom-lock collection.
    CreateCollection,
    /// Storing a secret.
    StoreSecret,
    /// Reading a secret.
    ReadSecret,
    /// Deleting a secret.
    DeleteSecret,
    /// Unlocking a collection for a batch operation.
    UnlockCollection,
    /// Fetching arbitrary data from the user on an application's behalf.
    #[default]
    RequestUserData,
}

/// Kind of input the interaction UI should collect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum InputType {
    /// Digits only.
    Numeric,
    /// Free-form text.
    #[default]
    AlphaNumeric,
}

/// How the interaction UI echoes typed input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum EchoMode {
    /// Input is shown as typed.
    Normal,
    /// Input is masked.
    PasswordEcho,
    /// Input is briefly shown while edited, then masked.
    #[default]
    PasswordEchoOnEdit,
    /// Nothing is shown.
    NoEcho,
}

/// Parameters handed to an authentication plugin when beginning a
/// user-interaction flow.
///
/// The processor always overwrites `application_id` with the resolved caller
/// identity and clears caller-supplied prompt ids before forwarding, so a
/// malicious application cannot impersonate another prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionParameters {
    /// Application the flow is performed on behalf of.
    pub application_id: String,
    /// Collection the flow concerns; may be empty.
    pub collection_name: String,
    /// Secret the flow concerns; may be empty.
    pub secret_name: String,
    /// Authentication plugin to drive the flow; empty selects the default.
    pub authentication_plugin: String,
    /// Operation being authorised.
    pub operation: InteractionOperation,
    /// Kind of input to collect.
    pub input_type: InputType,
    /// Echo behaviour of the input field.
    pub echo_mode: EchoMode,
    /// Free-form prompt text shown to the user.
    pub prompt_text: String,
    /// Translation id of a canned prompt.
    pub prompt_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(InteractionOperation::StoreSecret.to_string(), "StoreSecret");
        assert_eq!(
            InteractionOperation::RequestUserData.to_string(),
            "RequestUserData"
        );
    }

    #[test]
    fn test_defaults_suit_key_entry() {
        let params = InteractionParameters::default();
        assert_eq!(params.input_type, InputType::AlphaNumeric);
        assert_eq!(params.echo_mode, EchoMode::PasswordEchoOnEdit);
        assert_eq!(params.operation, InteractionOperation::RequestUserData);
    }
}
