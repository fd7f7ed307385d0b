// kubeforge/src/connector/dialer.rs

//! The connection pool.

use super::{Connection, Connector, Host};
use crate::error::ForgeResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{event, instrument, Level};

type Slot = Arc<OnceCell<Arc<dyn Connection>>>;

/// Lazily dials and memoizes one connection per host index.
///
/// The pool map is only locked for lookups, inserts and removals; dialing happens
/// outside the lock so different hosts connect in parallel, while concurrent
/// requests for the same host wait on a single dial.
pub struct Dialer {
  connector: Arc<dyn Connector>,
  pool: Mutex<HashMap<usize, Slot>>,
}

impl Dialer {
  pub fn new(connector: Arc<dyn Connector>) -> Self {
    Self {
      connector,
      pool: Mutex::new(HashMap::new()),
    }
  }

  /// Returns the pooled connection for `host`, dialing it first if needed.
  /// A failed dial leaves nothing behind, so the next call dials again.
  #[instrument(name = "Dialer::connect", skip_all, fields(host = %host.name(), index = host.index()), err(Display))]
  pub async fn connect(&self, host: &Host) -> ForgeResult<Arc<dyn Connection>> {
    let slot = {
      let mut pool = self.pool.lock();
      pool.entry(host.index()).or_default().clone()
    };

    let conn = slot
      .get_or_try_init(|| async {
        event!(Level::DEBUG, address = %host.address(), "Dialing new connection.");
        self.connector.connect(host).await
      })
      .await?;
    Ok(conn.clone())
  }

  /// Closes the pooled connection of `host` (if any) and forgets it. A dial still in
  /// flight keeps its slot; its connection is pooled and later closed by `close_all`.
  pub async fn close(&self, host: &Host) -> ForgeResult<()> {
    let conn = {
      let mut pool = self.pool.lock();
      let live = pool.get(&host.index()).and_then(|slot| slot.get().cloned());
      match live {
        Some(conn) => {
          pool.remove(&host.index());
          Some(conn)
        }
        None => {
          if pool.contains_key(&host.index()) {
            event!(Level::DEBUG, host = %host.name(), "Dial in flight, connection left pooled.");
          }
          None
        }
      }
    };
    match conn {
      Some(conn) => {
        event!(Level::DEBUG, host = %host.name(), "Closing connection.");
        conn.close().await
      }
      None => Ok(()),
    }
  }

  /// Closes and forgets every live pooled connection. Slots with a dial in flight are
  /// kept. Close errors are logged, not returned.
  pub async fn close_all(&self) {
    let live: Vec<(usize, Arc<dyn Connection>)> = {
      let mut pool = self.pool.lock();
      let mut live = Vec::new();
      pool.retain(|index, slot| match slot.get() {
        Some(conn) => {
          live.push((*index, conn.clone()));
          false
        }
        None => true,
      });
      live
    };
    for (index, conn) in live {
      if let Err(e) = conn.close().await {
        event!(Level::WARN, index, error = %e, "Failed to close connection.");
      }
    }
  }

  /// True if a live connection is pooled under `index`.
  pub fn is_connected(&self, index: usize) -> bool {
    self.pool.lock().get(&index).map_or(false, |slot| slot.initialized())
  }

  /// Number of live pooled connections.
  pub fn len(&self) -> usize {
    self.pool.lock().values().filter(|slot| slot.initialized()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl fmt::Debug for Dialer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Dialer").field("live_connections", &self.len()).finish()
  }
}
