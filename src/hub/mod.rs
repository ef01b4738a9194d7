//! Connection registry: live client connections, their groups, and the send capability
//!
//! One `Hub` type serves both endpoints; the membership policy decides how a
//! connecting principal is indexed.

pub mod counter;
pub mod groups;
pub mod hub;
pub mod identity;
pub mod message;
pub mod metrics;
pub mod policy;
pub mod registry;

pub use counter::{global_counter, ConnectionCounter};
pub use hub::{ConnectionId, Hub, HubOptions, Registration};
pub use identity::{Identity, OrganizationMembership, OrganizationRole, Principal};
pub use message::{ClientMessage, ClientMethod, Frame, ServerMessage};
pub use metrics::{HubMetrics, HubMetricsSnapshot};
pub use policy::{AnonymousMembership, AuthenticatedMembership, MembershipPolicy, Memberships};
pub use registry::{ConnectionRegistry, DeliveryReport, HubKind, Scope};
