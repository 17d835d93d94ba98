pub mod alert;
pub mod escalation;
pub mod message;
pub mod notification;
pub mod responder;
pub mod role;

pub use alert::{AlertStatus, AlertType, EmergencyAlert, EscalationLevel, NewAlert, Precondition, ResolutionType};
pub use escalation::{EscalationEvent, EscalationReason};
pub use message::{MessageType, OutboundMessage};
pub use notification::{AlertNotification, NotificationChannel};
pub use responder::ResponderRecord;
pub use role::Role;

/// Raised when a text column or payload does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enums stored as TEXT columns. The literal must match the serde
/// `snake_case` name so the wire and the database agree.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;
