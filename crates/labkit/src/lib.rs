//! # Labkit
//!
//! GitLab REST adapters for the [`reconcile`] engine.
//!
//! ## Layers
//!
//! - **backend**: raw JSON transport ([`backend::http::HttpBackend`] or the
//!   in-memory [`backend::MockBackend`])
//! - **client**: typed `get`/`post`/`put`/`delete` over a backend
//! - **resources**: one [`reconcile::RemoteAdapter`] per managed kind
//! - **lookup**: read-only queries for groups, projects, branches and members
//!
//! ## Example
//!
//! ```no_run
//! use labkit::Client;
//! use labkit::resources::group_variable::{GroupVariable, GroupVariableAdapter};
//! use reconcile::{AccessLevelRegistry, Instance, Orchestrator};
//!
//! let client = Client::gitlab_com(std::env::var("GITLAB_TOKEN").ok())?;
//! let adapter = GroupVariableAdapter::new(client);
//! let registry = AccessLevelRegistry::gitlab();
//! let orch = Orchestrator::new(&adapter, &registry);
//!
//! let desired = GroupVariable {
//!     group: Some("acme".into()),
//!     key: Some("DEPLOY_ENV".into()),
//!     value: Some("production".into()),
//!     ..Default::default()
//! };
//! let mut instance = Instance::absent();
//! orch.create(&mut instance, &desired)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod lookup;
pub mod resources;

pub use backend::http::DEFAULT_API_BASE;
pub use backend::{Backend, Method, MockBackend};
pub use client::Client;
pub use error::{Error, Result};
pub use lookup::Lookup;
pub use resources::KINDS;
