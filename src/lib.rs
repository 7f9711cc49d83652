pub mod clients;
pub mod processor;
pub mod runtime;

pub use clients::{Envelope, SidekiqSink, SourceQueue, SqsReceiveOptions, SqsSource, WorkerSink};
pub use processor::message::{MessageProcessor, Outcome, SkipReason};
pub use processor::routing::{topic_name, RoutingTable};
pub use processor::scheduler::Scheduler;
pub use processor::shutdown::{InFlightCounter, InFlightGuard, ShutdownCoordinator, ShutdownState};
pub use runtime::config::{RelayConfig, RelayConfigBuilder, ScoutConfig};
pub use runtime::fatal::FatalErrorHandler;
pub use runtime::liveness::{LivenessProbe, PidFile};
pub use runtime::runner::Relay;
pub use runtime::telemetry::{init_tracing_with, LogFormat, Telemetry, TelemetrySnapshot};
