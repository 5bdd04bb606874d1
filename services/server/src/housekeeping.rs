//! The 1 Hz server housekeeping tick (§4.9): infers `INTERNET_LOST` and
//! `BREACH` for clients that have gone silent or whose breach deadline has
//! elapsed, independent of any datagram arriving.

use alarm_host::interfaces::{Clock, HandlerDispatch, LogRecord, Logger};
use alarm_protocol::EventKind;
use tracing::info;

use crate::registry::ClientRegistry;

pub async fn tick<C, L, H>(
    registry: &ClientRegistry,
    clock: &C,
    logger: &L,
    dispatch: &H,
    ip_loss_tolerance: u64,
) where
    C: Clock,
    L: Logger,
    H: HandlerDispatch,
{
    let now = clock.now_secs().await;
    for client in registry.all().await {
        let (client_id, lost_connectivity, breached) = {
            let mut guard = client.lock().await;
            let client_id = guard.client_id.clone();
            let lost = guard.check_ip_loss(now, ip_loss_tolerance);
            let breached = guard.check_breach(now);
            (client_id, lost, breached)
        };

        if lost_connectivity {
            info!(client_id = %client_id, "internet connectivity lost (inferred)");
            emit_inferred(logger, dispatch, &client_id, EventKind::InternetLost, now).await;
        }
        if breached {
            info!(client_id = %client_id, "breach timeout elapsed (inferred)");
            emit_inferred(logger, dispatch, &client_id, EventKind::Breach, now).await;
        }
    }
}

async fn emit_inferred<L, H>(logger: &L, dispatch: &H, client_id: &str, event: EventKind, now: u64)
where
    L: Logger,
    H: HandlerDispatch,
{
    let _ = logger
        .log_event(&LogRecord {
            timestamp_secs: now,
            client_id: client_id.to_owned(),
            seq: None,
            mmss: None,
            event,
            sensor_id: String::new(),
            extra: String::new(),
        })
        .await;
    dispatch.invoke(event.name(), client_id, event, "", "").await;
}
