pub mod directory;
pub mod lifecycle;
pub mod router;
pub mod scheduler;
pub mod transition;

pub use directory::ResponderDirectory;
pub use lifecycle::AlertManager;
pub use router::{tier_roles, Audience, DeliverySummary, NotificationRouter};
pub use scheduler::{is_overdue, EscalationScheduler, SweepReport};
pub use transition::{apply, AlertAction, AlertTransition};
