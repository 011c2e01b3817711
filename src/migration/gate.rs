// ABOUTME: Disables and restores foreign-key enforcement on the destination
// ABOUTME: Brackets the copy phase so enforcement is restored on every exit path

use super::session::{DestinationSession, ReplicationRole};
use crate::error::Result;

/// Foreign-key enforcement switched off on a destination session.
///
/// Created by [`ConstraintGate::engage`]; enforcement comes back with
/// [`ConstraintGate::release`]. Callers must not return between the two, and
/// should combine the copy result with the release result using [`settle`].
pub struct ConstraintGate<'a, D: DestinationSession> {
    destination: &'a mut D,
    released: bool,
}

impl<'a, D: DestinationSession> ConstraintGate<'a, D> {
    /// Set `session_replication_role = 'replica'` on `destination`
    pub async fn engage(destination: &'a mut D) -> Result<ConstraintGate<'a, D>> {
        tracing::info!("Disabling foreign key constraints...");
        destination
            .set_replication_role(ReplicationRole::Replica)
            .await?;
        tracing::info!("Foreign key constraints disabled");

        Ok(Self {
            destination,
            released: false,
        })
    }

    /// The destination session while enforcement is off
    pub fn destination(&mut self) -> &mut D {
        &mut *self.destination
    }

    /// Restore `session_replication_role = 'origin'`
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        tracing::info!("Re-enabling foreign key constraints...");
        self.destination
            .set_replication_role(ReplicationRole::Origin)
            .await?;
        tracing::info!("Foreign key constraints enabled");
        Ok(())
    }
}

impl<D: DestinationSession> Drop for ConstraintGate<'_, D> {
    fn drop(&mut self) {
        if !self.released {
            // Session scoped: the server resets it once the connection closes.
            tracing::error!(
                "Constraint gate dropped without release; foreign key enforcement stays off until the destination connection closes"
            );
        }
    }
}

/// Combine the outcome of the gated work with the outcome of the release.
///
/// The work error wins when both failed; the release error is logged so it
/// is not lost.
pub fn settle<T>(work: Result<T>, released: Result<()>) -> Result<T> {
    match (work, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(work_err), Ok(())) => Err(work_err),
        (Err(work_err), Err(release_err)) => {
            tracing::error!("Failed to re-enable foreign key constraints: {}", release_err);
            Err(work_err)
        }
    }
}
