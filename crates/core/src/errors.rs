use thiserror::Error;

use crate::config::ConfigError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown person: {0}")]
    UnknownPerson(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("delivery failure: {0}")]
    Delivery(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("unexpected failure: {0}")]
    Fault(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text that is safe to show in the chat; never includes the internal message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "That input could not be used. Check it and try again.",
            Self::ServiceUnavailable { .. } => {
                "Something went wrong while saving or loading data. Please try again."
            }
            Self::Internal { .. } => {
                "An error occurred while processing your request. Please try again."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Delivery(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) | ApplicationError::Fault(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigError;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::InvalidInput("2024-13-01".to_owned()))
                .into_interface("upd-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "upd-1"
        ));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database is locked".to_owned())
            .into_interface("upd-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "upd-2");
        assert_eq!(
            interface.user_message(),
            "Something went wrong while saving or loading data. Please try again."
        );
    }

    #[test]
    fn delivery_error_shares_the_unavailable_message() {
        let interface =
            ApplicationError::Delivery("telegram 502".to_owned()).into_interface("upd-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing bot token".to_owned()).into_interface("upd-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(
            interface.user_message(),
            "An error occurred while processing your request. Please try again."
        );
    }

    #[test]
    fn config_error_becomes_configuration_failure() {
        let error = ApplicationError::from(ConfigError::Validation(
            "telegram.bot_token is required".to_owned(),
        ));

        assert!(matches!(&error, ApplicationError::Configuration(message) if message.contains("bot_token")));
        assert!(matches!(error.into_interface("boot"), InterfaceError::Internal { .. }));
    }

    #[test]
    fn fault_maps_to_internal_and_hides_panic_text() {
        let interface = ApplicationError::Fault("index out of bounds".to_owned())
            .into_interface("upd-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(!interface.user_message().contains("index"));
    }

    #[test]
    fn user_message_never_leaks_internal_detail() {
        let interface = ApplicationError::Persistence("UNIQUE constraint failed: item.name".to_owned())
            .into_interface("upd-5");

        assert!(!interface.user_message().contains("UNIQUE"));
    }
}
