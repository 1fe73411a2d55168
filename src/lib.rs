pub mod engagements;
pub mod error;
pub mod hubspot;
pub mod state;
pub mod types;

pub use engagements::EngagementPipeline;
pub use error::{EngagementError, ErrorPayload};
pub use types::{EngagementItem, EngagementKind, EngagementsPayload, EntityKind, EntityRef};
