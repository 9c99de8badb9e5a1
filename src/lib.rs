//! # Live Query
//!
//! Keeps a client-side view of a query's result in sync with an external
//! database that only says "something changed".
//!
//! ## Core Concepts
//!
//! - **Source**: the host database boundary ([`DataSource`]): readiness,
//!   evaluation, payload-free change listeners
//! - **Subscription**: one query bound to one consumer; re-evaluated on a
//!   trailing-edge debounce after change notifications, delivered only when
//!   the rows actually differ ([`QuerySubscription`])
//! - **Live query**: the `{ results, loading, error }` view that gates on
//!   readiness and re-subscribes when its query changes ([`LiveQuery`])
//! - **Agents**: the agent list and system prompt views built on top
//!
//! ## Example
//!
//! ```ignore
//! use livequery::{AgentDirectory, LiveQueryConfig, TimerScheduler};
//!
//! let source: Arc<dyn DataSource> = host_database();
//! let scheduler = Arc::new(TimerScheduler::new()?);
//!
//! let directory = AgentDirectory::new(source, scheduler, &LiveQueryConfig::default());
//! for agent in directory.agents() {
//!     println!("{}: {}", agent.name, agent.description);
//! }
//! ```

pub mod abort;
pub mod agents;
pub mod config;
pub mod debounce;
pub mod equality;
pub mod error;
pub mod scheduler;
pub mod source;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use abort::{AbortController, AbortRegistration, AbortSignal};
pub use agents::{
    agents_from_rows, blocks_from_rows, blocks_to_markdown, system_prompt_query, AgentDirectory,
    AgentInfo, AgentPrompt, Block, AGENT_LIST_QUERY,
};
pub use config::{LiveQueryConfig, DEFAULT_DEBOUNCE_MS};
pub use debounce::Debouncer;
pub use equality::{deep_equal, rows_equal};
pub use error::{QueryError, Result};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TaskState, TimerScheduler};
pub use source::{ChangeListener, DataSource, MemorySource, ReadySignal};
pub use subscriptions::{LiveQuery, QueryEvent, QueryState, QuerySubscription, SubscriptionOptions};
pub use types::{ListenerId, Query, SubscriptionId};
