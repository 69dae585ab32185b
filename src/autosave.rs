//! Background autosave — debounced partial saves of in-progress forms.
//!
//! Every form change is reported to the agent; once the form has been quiet
//! for the configured debounce window the latest snapshot is merged into the
//! store as a partial record. Saves are fire-and-forget from the applicant's
//! point of view: failures are logged and the next change simply tries
//! again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::model::ApplicationDetails;
use crate::store::{ApplicationPatch, ApplicationStore};
use crate::wizard::{ApplicationForm, WizardStep};

/// Build the partial-save patch for the current form snapshot.
///
/// Credentials never appear here — `ApplicationPatch` has no password field
/// by construction. Details are only written on the licensed branch;
/// unlicensed progress is owned by the checklist, not the wizard, and a
/// wizard save must not clobber it.
pub fn partial_patch(form: &ApplicationForm, step: WizardStep) -> ApplicationPatch {
    let details = form
        .is_licensed_driver
        .then(|| ApplicationDetails::Licensed(form.licensed_details()));

    ApplicationPatch {
        first_name: Some(form.first_name.clone()),
        last_name: Some(form.last_name.clone()),
        email: Some(form.email.clone()),
        phone: Some(form.phone.clone()),
        area: Some(form.area.clone()),
        details,
        is_partial: Some(true),
        current_step: Some(step.number()),
        ..Default::default()
    }
}

/// True when the snapshot is an empty shell not worth persisting.
fn is_empty_shell(patch: &ApplicationPatch) -> bool {
    patch.first_name.as_deref().unwrap_or("").is_empty()
        && patch.email.as_deref().unwrap_or("").is_empty()
}

enum Signal {
    Changed { id: String, patch: ApplicationPatch },
    Flush(oneshot::Sender<()>),
}

/// Debounced autosave agent. Cheap to clone the sender side; the save task
/// lives until the agent is dropped.
pub struct AutosaveAgent {
    tx: mpsc::UnboundedSender<Signal>,
}

impl AutosaveAgent {
    /// Spawn the save task.
    pub fn spawn(store: Arc<dyn ApplicationStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, debounce, rx));
        Self { tx }
    }

    /// Report a form change. Resets the debounce timer.
    pub fn record_change(&self, id: &str, form: &ApplicationForm, step: WizardStep) {
        let signal = Signal::Changed {
            id: id.to_string(),
            patch: partial_patch(form, step),
        };
        // Send fails only when the save task is gone, which means shutdown
        let _ = self.tx.send(signal);
    }

    /// Persist any pending snapshot immediately and wait for it to land.
    /// Used when the applicant navigates steps, so resume state is current.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Signal::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run(
    store: Arc<dyn ApplicationStore>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Signal>,
) {
    let mut pending: Option<(String, ApplicationPatch)> = None;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Signal::Changed { id, patch }) => {
                    // Newest snapshot wins; the timer restarts on the next
                    // select pass
                    pending = Some((id, patch));
                }
                Some(Signal::Flush(ack)) => {
                    save_pending(store.as_ref(), &mut pending).await;
                    let _ = ack.send(());
                }
                None => {
                    save_pending(store.as_ref(), &mut pending).await;
                    break;
                }
            },
            _ = tokio::time::sleep(debounce), if pending.is_some() => {
                save_pending(store.as_ref(), &mut pending).await;
            }
        }
    }
}

async fn save_pending(
    store: &dyn ApplicationStore,
    pending: &mut Option<(String, ApplicationPatch)>,
) {
    let Some((id, patch)) = pending.take() else {
        return;
    };
    if is_empty_shell(&patch) {
        debug!(application_id = %id, "Skipping autosave of empty form");
        return;
    }
    match store.merge(&id, patch).await {
        Ok(app) => {
            debug!(application_id = %id, step = ?app.current_step, "Partial application saved");
        }
        // Autosave must never surface to the applicant; the next change
        // retries naturally
        Err(e) => warn!(application_id = %id, error = %e, "Autosave failed"),
    }
}
