pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod tool;
pub mod tools;

pub use config::{RouterConfig, ScoringConfig};
pub use coordinator::{Coordinator, RouteOutcome, RouterState};
pub use error::{Result, RouterError};
pub use registry::{CapabilityDescriptor, ToolRegistry};
pub use resolver::{IntentResolver, ToolResolution};
pub use session::{SessionState, SessionStore, WorkflowInstance, WorkflowStage};
pub use tool::{DatasetContext, Tool, ToolContext, ToolRequest, ToolResult};
