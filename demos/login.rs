//! Login - opens a session and starts phone authentication.
//!
//! This example demonstrates:
//! - Connecting with the session builder
//! - Sending the session-init and auth-request payloads
//! - Printing every inbound frame through a handler
//!
//! # Running
//!
//! ```text
//! RUST_LOG=oneme_client=debug cargo run --example login -- +79111111111
//! ```

use std::time::Duration;

use oneme_client::payloads::{AuthRequest, SessionInit};
use oneme_client::{Frame, Session};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let phone = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "+79111111111".to_string());

    let session = Session::builder()
        .handler(|frame: Frame| match frame.decode_body() {
            Ok(body) => println!("<- {} {}", frame.info(), body),
            Err(e) => println!("<- {} (undecodable body: {e})", frame.info()),
        })
        .connect()
        .await?;

    let seq = session.send(SessionInit::default().into_frame()?).await?;
    println!("-> session init #{seq}");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let seq = session.send(AuthRequest::new(phone).into_frame()?).await?;
    println!("-> auth request #{seq}");

    // Print whatever the server pushes for a minute, or until it hangs up.
    tokio::select! {
        _ = session.closed() => println!("server closed the session"),
        _ = tokio::time::sleep(Duration::from_secs(60)) => session.close(),
    }

    Ok(())
}
