//! Tmux Supervisor - 监管运行在 tmux 会话里的自主编码代理

pub mod checkpoint;
pub mod config;
pub mod delivery;
pub mod git;
pub mod lifecycle;
pub mod quality;
pub mod status;
pub mod supervisor;
pub mod tmux;

pub use checkpoint::{CheckpointEnforcer, CheckpointOutcome};
pub use config::SupervisorConfig;
pub use delivery::log::{DeliveryLog, DeliveryRecord};
pub use delivery::{DeliveryAck, DeliveryError, MessageChannel, TargetAddress};
pub use git::{ChangedPath, GitRepo, Vcs};
pub use lifecycle::{LifecycleClassifier, PhaseTransition, ProjectPhase, PHASE_MARKER_FILE};
pub use quality::{
    detect_manifest, FindingKind, ManifestKind, ProbeRunner, QualityDetector, QualityFinding,
    SystemProbeRunner,
};
pub use status::{CycleSnapshot, DeliveryReport, HubConfig, StatusPublisher};
pub use supervisor::{contains_stuck_indicator, SupervisedUnit, Supervisor};
pub use tmux::{SessionDirectory, TmuxManager};
