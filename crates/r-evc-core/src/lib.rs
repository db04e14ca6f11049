//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Polling coordinators, cache, optimistic guards and command dispatch for R-EVC.

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod location;
pub mod materiality;
pub mod orchestrator;
pub mod pending;
pub mod polling;
pub mod push;
pub mod registry;
pub mod telemetry;
pub mod value_guard;

pub use cache::{CacheUpdate, VehicleCache, VehicleSnapshot};
pub use dispatcher::{CommandDispatcher, CommandOutcome, DispatchSettings};
pub use error::{CommandError, CoordinatorError};
pub use guard::Guard;
pub use location::{LocationCoordinator, LocationSettings};
pub use materiality::MaterialSnapshot;
pub use orchestrator::{FleetHandle, FleetOrchestrator};
pub use pending::{CommandMemory, ConfirmationStrategy, PendingState};
pub use polling::{Coordinator, CycleReport, PollingState, PowerStateSource};
pub use push::PushIngestion;
pub use registry::{CoordinatorRegistry, VehicleCoordinators};
pub use telemetry::{ClimatePatch, TelemetryCoordinator, TelemetrySettings};
