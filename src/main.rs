//! Command line DDP client built on `ddpwire`.
//!
//! Connects, subscribes, optionally calls a method and prints collection
//! contents. With `--watch` it keeps printing changes until interrupted.

mod cli;

use std::time::Duration;

use clap::Parser;
use ddpwire::{ObserveCallbacks, Selector, Session};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let mut builder = Session::builder().connect_timeout(Duration::from_secs(cli.timeout));
    if !cli.protocols.is_empty() {
        builder = builder.protocol_versions(cli.protocols.iter().cloned());
    }
    if let Some(token) = &cli.resume_token {
        builder = builder.resume_token(token.clone());
    }
    let session = builder.connect(&cli.url).await?;
    println!("connected: {}", session.session_id().unwrap_or_default());

    let names = if cli.collections.is_empty() {
        &cli.subscriptions
    } else {
        &cli.collections
    };
    let collections: Vec<_> = names.iter().map(|name| session.collection(name)).collect();

    let mut subscriptions = Vec::with_capacity(cli.subscriptions.len());
    for name in &cli.subscriptions {
        subscriptions.push(session.subscribe(name, Vec::new())?);
    }
    for subscription in &subscriptions {
        match subscription.ready().await {
            Ok(()) => println!("ready: {}", subscription.name()),
            Err(err) => eprintln!("subscription {} failed: {err}", subscription.name()),
        }
    }

    if let Some(method) = &cli.call {
        let params = cli
            .args
            .iter()
            .map(|arg| serde_json::from_str(arg))
            .collect::<Result<Vec<Value>, _>>()?;
        match session.call(method, params)?.result().await {
            Ok(result) => println!("{method} -> {result}"),
            Err(err) => eprintln!("{method} failed: {err}"),
        }
    }

    for collection in &collections {
        println!("{} ({} documents)", collection.name(), collection.len());
        for doc in collection.find(Selector::All).fetch() {
            println!("  {}", doc.to_value());
        }
    }

    if cli.watch {
        let mut handles = Vec::with_capacity(collections.len());
        for collection in &collections {
            let name = collection.name().to_owned();
            let (added, changed, removed) = (name.clone(), name.clone(), name);
            let callbacks = ObserveCallbacks::new()
                .on_added(move |doc| println!("+ {added} {}", doc.to_value()))
                .on_changed(move |doc, _| println!("~ {changed} {}", doc.to_value()))
                .on_removed(move |doc| println!("- {removed} {}", doc.id()));
            handles.push(collection.find(Selector::All).observe(callbacks));
        }
        tokio::signal::ctrl_c().await?;
        drop(handles);
    }

    session.close().await;
    Ok(())
}
