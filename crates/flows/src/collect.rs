//! Session establishment and signature collection
use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use iou_crypto::PublicKey;
use iou_ledger::{Party, SignedTransaction};

use crate::messaging::{receive_within, FlowMessage, FlowSession};
use crate::{FlowContext, FlowError, FlowResult};

/// Open a session to `counterparty`, retrying transient failures with
/// exponential backoff
pub async fn open_session(
    ctx: &FlowContext,
    initiator: &Party,
    counterparty: &Party,
) -> FlowResult<Box<dyn FlowSession>> {
    let attempts = ctx.settings.session_attempts.max(1);
    let mut backoff = ctx.settings.retry_backoff();
    let mut attempt = 1;

    loop {
        match ctx.messaging.open_session(initiator, counterparty).await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(
                    "Attempt {}/{} to reach {} failed: {}; retrying in {:?}",
                    attempt, attempts, counterparty, e, backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Open one session per counterparty
pub async fn open_sessions(
    ctx: &FlowContext,
    initiator: &Party,
    counterparties: &[Party],
) -> FlowResult<Vec<Box<dyn FlowSession>>> {
    let mut sessions = Vec::with_capacity(counterparties.len());
    for counterparty in counterparties {
        sessions.push(open_session(ctx, initiator, counterparty).await?);
    }
    Ok(sessions)
}

/// Send `stx` to every session and gather the signatures they return.
///
/// A returned signature must come from the session's counterparty, be by a
/// key that has not yet signed, and verify over the ID that was sent. Only
/// the notary's signature may be missing from the result.
pub async fn collect_signatures(
    ctx: &FlowContext,
    stx: &SignedTransaction,
    sessions: &[Box<dyn FlowSession>],
) -> FlowResult<SignedTransaction> {
    let id = stx.id()?;
    let notary_key = stx.tx.notary.owning_key;
    let expected: BTreeSet<PublicKey> = stx
        .missing_signers()
        .into_iter()
        .filter(|key| *key != notary_key)
        .collect();

    for session in sessions {
        session
            .send(FlowMessage::SignatureRequest {
                transaction: stx.clone(),
            })
            .await?;
        debug!("Requested signatures over {} from {}", id, session.counterparty());
    }

    let mut signed = stx.clone();
    for session in sessions {
        let counterparty = session.counterparty();
        match receive_within(&**session, ctx.settings.response_timeout()).await? {
            FlowMessage::Signatures { signatures } => {
                for sig in &signatures {
                    if sig.by != counterparty.owning_key || !expected.contains(&sig.by) {
                        return Err(FlowError::Protocol(format!(
                            "{} returned a signature by unexpected key {}",
                            counterparty, sig.by
                        )));
                    }
                    sig.verify(&id)?;
                }
                info!("Received {} signature(s) from {}", signatures.len(), counterparty);
                signed = signed.with_additional_signatures(signatures);
            }
            FlowMessage::Refused { reason } => {
                return Err(FlowError::CounterpartyRefused {
                    party: counterparty.name.clone(),
                    reason,
                });
            }
            other => {
                return Err(FlowError::Protocol(format!(
                    "expected signatures from {}, got {}",
                    counterparty,
                    other.kind()
                )));
            }
        }
    }

    signed.verify_signatures_except(&[notary_key])?;
    Ok(signed)
}
