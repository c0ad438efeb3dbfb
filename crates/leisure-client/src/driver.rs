//! The drive loop.
//!
//! ```text
//! ┌─► update() ── false ──────────────────────────────┐
//! │      │ true                                       │
//! │      ▼                                            │
//! │   generate() → edit() → handle(update)            │
//! │      │                                            │
//! └──────┴──── pause (poll_interval or yield) ◀───────┘
//!              any error: stop, mark the session dead
//! ```
//!
//! Each stage awaits the previous one, so there is never more than one
//! request from the loop in flight. A second loop on the same session is
//! refused.

use leisure_types::Edit;
use tracing::{debug, error};

use crate::error::{ClientError, ClientResult};
use crate::session::{SessionClient, Update};
use crate::transport::Transport;

impl<T: Transport> SessionClient<T> {
    /// One poll cycle. Returns whether an update was handled.
    pub async fn cycle<G, H>(&self, generate: &mut G, handle: &mut H) -> ClientResult<bool>
    where
        G: FnMut() -> Edit + Send,
        H: FnMut(Update) -> ClientResult<()> + Send,
    {
        if !self.update().await? {
            return Ok(false);
        }
        let edit = generate();
        let update = self.edit(&edit).await?;
        handle(update)?;
        Ok(true)
    }

    /// Poll and apply until something fails. Returns the error that ended
    /// the loop; the session is dead afterwards.
    pub async fn drive<G, H>(&self, mut generate: G, mut handle: H) -> ClientError
    where
        G: FnMut() -> Edit + Send,
        H: FnMut(Update) -> ClientResult<()> + Send,
    {
        if !self.try_begin_drive() {
            return ClientError::AlreadyDriving;
        }
        let mut cycles = 0u64;
        let err = loop {
            match self.cycle(&mut generate, &mut handle).await {
                Ok(handled) => {
                    cycles += 1;
                    if handled {
                        debug!(cycles, "update handled");
                    }
                }
                Err(err) => break err,
            }
            let pause = self.poll_interval();
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        };
        error!(%err, cycles, "drive loop stopped");
        self.mark_dead();
        self.end_drive();
        err
    }

    /// [`drive`](Self::drive), handing the final error to `on_error`.
    pub async fn run_update_loop<G, H, E>(&self, generate: G, handle: H, on_error: E)
    where
        G: FnMut() -> Edit + Send,
        H: FnMut(Update) -> ClientResult<()> + Send,
        E: FnOnce(ClientError),
    {
        let err = self.drive(generate, handle).await;
        on_error(err);
    }
}
