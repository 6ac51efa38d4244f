// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-flight coordination of in-progress loads
//!
//! Each resolved path being loaded has one [`LoadTicket`] in the
//! [`PendingTable`]. The first caller owns the ticket and performs the load;
//! callers on other threads block on the ticket until the owner finishes,
//! and a caller that already owns the ticket (a recursive require) is told
//! so instead of blocking on itself.
//!
//! Lock order is always table, then ticket. The table lock is only held
//! for the create/join decision and for removal, never across a load.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketStatus {
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug)]
struct TicketState {
    owner: Option<ThreadId>,
    status: TicketStatus,
    /// Cleared once another thread waits; the waiter then removes the ticket
    remove_on_release: bool,
}

/// Coordination record for one in-progress load
#[derive(Debug)]
pub struct LoadTicket {
    path: PathBuf,
    state: Mutex<TicketState>,
    released: Condvar,
}

impl LoadTicket {
    fn owned_by(path: &Path, owner: ThreadId) -> Self {
        Self {
            path: path.to_path_buf(),
            state: Mutex::new(TicketState {
                owner: Some(owner),
                status: TicketStatus::Loading,
                remove_on_release: true,
            }),
            released: Condvar::new(),
        }
    }

    /// The resolved path this ticket guards
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Thread performing the load
    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// True once the owner has released the ticket
    pub fn is_released(&self) -> bool {
        self.state.lock().status != TicketStatus::Loading
    }
}

/// Result of [`PendingTable::acquire_or_join`]
#[derive(Debug)]
pub enum Acquire<'a> {
    /// The caller owns the load and must complete the guard
    Owned(TicketGuard<'a>),
    /// The calling thread is already loading this path further up its stack
    OwnedByCaller,
    /// Another thread is loading this path; pass the ticket to [`PendingTable::wait`]
    Wait(Arc<LoadTicket>),
}

/// What a waiter observed when the owner released the ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The load succeeded; do not load again
    Loaded,
    /// The load failed; start over from resolution
    Failed,
}

/// Map of resolved paths to their in-progress loads
#[derive(Debug, Default)]
pub struct PendingTable {
    tickets: Mutex<FxHashMap<PathBuf, Arc<LoadTicket>>>,
}

impl PendingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the load of `path`, or find out who has it.
    pub fn acquire_or_join(&self, path: &Path) -> Acquire<'_> {
        let me = thread::current().id();
        let mut tickets = self.tickets.lock();

        if let Some(ticket) = tickets.get(path) {
            let mut state = ticket.state.lock();
            if state.owner == Some(me) && state.status == TicketStatus::Loading {
                debug!("{} is already being loaded by this thread", path.display());
                return Acquire::OwnedByCaller;
            }
            state.remove_on_release = false;
            debug!("Waiting for {} to finish loading", path.display());
            return Acquire::Wait(Arc::clone(ticket));
        }

        let ticket = Arc::new(LoadTicket::owned_by(path, me));
        tickets.insert(path.to_path_buf(), Arc::clone(&ticket));
        trace!("Took ticket for {}", path.display());
        Acquire::Owned(TicketGuard {
            table: self,
            ticket,
            finished: false,
        })
    }

    /// Block until the owner releases `ticket`.
    ///
    /// The waiter takes over cleanup: the ticket is removed from the table
    /// whatever the outcome, so a retry after failure starts a fresh load.
    pub fn wait(&self, ticket: Arc<LoadTicket>) -> WaitOutcome {
        let status = {
            let mut state = ticket.state.lock();
            while state.status == TicketStatus::Loading {
                ticket.released.wait(&mut state);
            }
            state.status
        };

        self.remove_if_current(&ticket);

        match status {
            TicketStatus::Succeeded => WaitOutcome::Loaded,
            _ => WaitOutcome::Failed,
        }
    }

    /// Whether a ticket exists for `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.tickets.lock().contains_key(path)
    }

    /// Number of tickets in the table
    pub fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.tickets.lock().is_empty()
    }

    fn remove_if_current(&self, ticket: &Arc<LoadTicket>) {
        let mut tickets = self.tickets.lock();
        if tickets
            .get(&ticket.path)
            .is_some_and(|current| Arc::ptr_eq(current, ticket))
        {
            tickets.remove(&ticket.path);
        }
    }
}

/// Ownership of an in-progress load.
///
/// Dropping the guard without calling [`succeed`](TicketGuard::succeed)
/// releases the ticket as failed, including when the load panics.
#[derive(Debug)]
pub struct TicketGuard<'a> {
    table: &'a PendingTable,
    ticket: Arc<LoadTicket>,
    finished: bool,
}

impl TicketGuard<'_> {
    /// The resolved path being loaded
    pub fn path(&self) -> &Path {
        self.ticket.path()
    }

    /// Release the ticket as loaded
    pub fn succeed(mut self) {
        self.release(true);
    }

    /// Release the ticket as failed
    pub fn fail(mut self) {
        self.release(false);
    }

    fn release(&mut self, loaded: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        {
            let mut tickets = self.table.tickets.lock();
            let mut state = self.ticket.state.lock();
            state.status = if loaded {
                TicketStatus::Succeeded
            } else {
                TicketStatus::Failed
            };
            if state.remove_on_release
                && tickets
                    .get(&self.ticket.path)
                    .is_some_and(|current| Arc::ptr_eq(current, &self.ticket))
            {
                tickets.remove(&self.ticket.path);
            }
        }

        trace!(
            "Released ticket for {} (loaded: {})",
            self.ticket.path.display(),
            loaded
        );
        self.ticket.released.notify_all();
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.release(false);
    }
}
