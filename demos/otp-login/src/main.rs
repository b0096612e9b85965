//! Terminal login against a storefront API.
//!
//! ```text
//! TETHER_BASE_URL=https://api.example.com RUST_LOG=tether=debug cargo run -p otp-login
//! ```
//!
//! Signs in with a phone number and OTP (or restores the saved session),
//! then accepts commands: `me`, `extend`, `status`, `logout`, `quit`.
//! Every line typed counts as activity.

use std::error::Error;

use tether::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base_url =
        std::env::var("TETHER_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let store_path =
        std::env::var("TETHER_STORE").unwrap_or_else(|_| "tether-session.json".to_string());

    let tether = TetherBuilder::new()
        .base_url(base_url)
        .store_path(store_path)
        .build()?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if tether.session().is_authenticated() {
        info!(status = %tether.status(), "restored saved session");
    } else {
        login(&tether, &mut input).await?;
    }

    let watcher = tokio::spawn(watch_status(tether.subscribe()));
    println!("commands: me, extend, status, logout, quit");

    while let Some(line) = input.next_line().await? {
        tether.activity().record(ActivityKind::KeyPress);
        match line.trim() {
            "me" => match tether
                .gateway()
                .send_json::<serde_json::Value>(ApiRequest::get("/auth/me"))
                .await
            {
                Ok(me) => println!("{me:#}"),
                Err(e) => println!("request failed: {e}"),
            },
            "extend" => match tether.extend_session().await {
                Ok(()) => println!("session extended"),
                Err(e) => println!("could not extend: {e}"),
            },
            "status" => println!("{:?}", tether.session()),
            "logout" => {
                tether.sign_out();
                login(&tether, &mut input).await?;
            }
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    watcher.abort();
    Ok(())
}

async fn login(tether: &Tether, input: &mut Input) -> Result<(), Box<dyn Error>> {
    loop {
        let phone = prompt(input, "phone number: ").await?;
        if let Err(e) = tether.send_otp(&phone).await {
            println!("{e}");
            continue;
        }

        loop {
            let code = prompt(input, "code: ").await?;
            match tether.verify_otp(&phone, &code).await {
                Ok(outcome) => {
                    if outcome.needs_name {
                        set_name(tether, input).await?;
                    }
                    println!("signed in");
                    return Ok(());
                }
                Err(e @ (SessionError::InvalidOtp(_) | SessionError::Validation(_))) => {
                    println!("{e}");
                }
                Err(e) => {
                    println!("{e}");
                    break;
                }
            }
        }
    }
}

async fn set_name(tether: &Tether, input: &mut Input) -> Result<(), Box<dyn Error>> {
    loop {
        let name = prompt(input, "your name: ").await?;
        match tether.set_name(&name).await {
            Ok(_) => return Ok(()),
            Err(e) => println!("{e}"),
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<String, Box<dyn Error>> {
    println!("{label}");
    match input.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err("stdin closed".into()),
    }
}

async fn watch_status(mut rx: tokio::sync::watch::Receiver<Session>) {
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().status;
        match status {
            SessionStatus::Warning => {
                println!("your session expires soon: type `extend` to stay signed in");
            }
            SessionStatus::Expired => println!("session expired, type `logout` to sign in again"),
            _ => {}
        }
    }
}
