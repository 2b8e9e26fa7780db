//! # graphfeed
//!
//! Query-expansion core for streaming authorized, filtered views of a
//! relational object graph to many long-lived clients.
//!
//! ## Features
//! - **Declarative queries**: clients describe objects, fields and
//!   transitive relations in a JSON tree
//! - **Live expansion**: the tree is resolved against current values into a
//!   closed key set, and re-resolved on every change batch
//! - **Consistent reads**: every cycle observes one datastore snapshot,
//!   even while the change feed keeps firing
//! - **Per-field authorization**: collection policies decide id-by-id field
//!   visibility, batched per `(collection, mode)`
//! - **Diff emissions**: subscriptions yield only what changed
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use graphfeed::{Autoupdate, Datastore, KeysBuilder, MemorySource, RestrictAllowed};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> graphfeed::Result<()> {
//!     let source = Arc::new(MemorySource::from_objects([(
//!         "meeting/1",
//!         r#"{"name": "spring assembly"}"#,
//!     )])?);
//!     let datastore = Datastore::new(source);
//!     let (_graceful_tx, graceful_rx) = watch::channel(());
//!     datastore.start(graceful_rx.clone());
//!
//!     let builder = KeysBuilder::from_json(
//!         r#"{"collection": "meeting", "ids": [1], "fields": {"name": null}}"#,
//!     )?;
//!     let service = Autoupdate::new(datastore, Arc::new(RestrictAllowed));
//!     let mut connection = service.connect(1, builder, graceful_rx);
//!     while let Some(data) = connection.next().await? {
//!         println!("{} keys changed", data.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod autoupdate;
pub mod config;
pub mod datastore;
pub mod keysbuilder;
pub mod metrics;
pub mod restrict;

mod constants;
mod errors;
mod key;

pub use autoupdate::*;
pub use config::*;
pub use constants::DEFAULT_CHANGE_FEED_CAPACITY;
pub use datastore::*;
pub use errors::*;
pub use key::Key;
pub use keysbuilder::*;
pub use restrict::*;

#[cfg(test)]
mod test_utils;
