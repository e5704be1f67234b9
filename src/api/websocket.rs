use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt as _;
use tracing::info;

use crate::collector::Collector;
use crate::fanout::Subscription;

/// Subscribes the connection to the live event stream until either side closes.
#[get("/ws")]
pub async fn ws_events(
    req: HttpRequest,
    body: web::Payload,
    collector: web::Data<Collector>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let broadcaster = collector.broadcaster().clone();
    let Subscription { id, mut rx } = broadcaster.subscribe();
    info!("WebSocket subscriber {} connected", id);

    actix_web::rt::spawn(async move {
        let mut close_reason = None;
        loop {
            tokio::select! {
                outbound = rx.recv() => match outbound {
                    Some(text) => {
                        if session.text(text).await.is_err() {
                            break;
                        }
                    }
                    // Pruned by the broadcaster for lagging behind.
                    None => break,
                },
                inbound = msg_stream.next() => match inbound {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        close_reason = reason;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
            }
        }

        broadcaster.unsubscribe(id);
        let _ = session.close(close_reason).await;
        info!("WebSocket subscriber {} closed", id);
    });

    Ok(response)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_events);
}
