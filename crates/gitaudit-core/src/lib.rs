//! Clock, identifier, secret and error primitives shared by every
//! component of the GitOps auditor. Nothing here
//! talks to a database, a process, or the network — those live in
//! `gitaudit-store` and `gitaudit-capabilities`.

pub mod clock;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod id;
pub mod logging;
pub mod permission;
pub mod rate_limit;
pub mod secret;
pub mod timer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ErrorKind, GitopsError, GitopsResult};
pub use event::{DomainEvent, EventPublisher, NoopEventPublisher};
pub use fingerprint::Fingerprint;
pub use id::{IdGen, SequentialIdGen, UuidV4Gen};
pub use logging::init_tracing;
pub use permission::{Action, Permission, Resource, Role};
pub use rate_limit::{RateLimiterRegistry, TokenBucket};
pub use secret::{CachedSecretProvider, EnvSecretProvider, SecretProvider};
pub use timer::TimerWheel;
