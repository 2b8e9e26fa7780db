//! Live subscriptions binding one parsed query tree to one request user.

mod connection;

#[cfg(test)]
mod connection_test;

pub use connection::Connection;
pub use connection::Emission;

use std::sync::Arc;

use tokio::sync::watch;

use crate::datastore::Datastore;
use crate::keysbuilder::KeysBuilder;
use crate::restrict::Restrict;

/// The subscription service. Cheap to clone per request handler.
#[derive(Clone)]
pub struct Autoupdate {
    datastore: Arc<Datastore>,
    restricter: Arc<dyn Restrict>,
}

impl Autoupdate {
    pub fn new(datastore: Arc<Datastore>, restricter: Arc<dyn Restrict>) -> Self {
        Autoupdate {
            datastore,
            restricter,
        }
    }

    /// Binds a query tree to a request user. The returned connection yields
    /// the full filtered view first and diffs afterwards, until the shutdown
    /// signal fires.
    pub fn connect(
        &self,
        user_id: u32,
        builder: KeysBuilder,
        shutdown: watch::Receiver<()>,
    ) -> Connection {
        Connection::new(
            Arc::clone(&self.datastore),
            Arc::clone(&self.restricter),
            user_id,
            builder,
            shutdown,
        )
    }
}
