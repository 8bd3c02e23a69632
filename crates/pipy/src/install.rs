// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Installing locked packages into sessions.

use crate::executor::{shell_quote, Strictness};
use crate::lock::LockFile;
use crate::session::{Lifetime, SessionKey, SessionManager};

#[cfg(test)]
#[path = "./install_test.rs"]
mod install_test;

/// Install the locked packages of `environment` into a throwaway session.
#[tracing::instrument(skip(sessions, lock))]
pub async fn install(
    sessions: &SessionManager,
    lock: &LockFile,
    project: &str,
    environment: &str,
    version: &str,
) -> crate::Result<()> {
    let key = SessionKey::new(format!("{project}-install"), version);
    apply_locked(sessions, lock, key, environment, Lifetime::Transient).await
}

/// Replace the project's session for `version` with a fresh one holding
/// exactly the locked packages of `environment`, and leave it running.
#[tracing::instrument(skip(sessions, lock))]
pub async fn sync(
    sessions: &SessionManager,
    lock: &LockFile,
    project: &str,
    environment: &str,
    version: &str,
) -> crate::Result<()> {
    // fail on the lookup before touching the existing session
    lock.packages(environment, version)?;

    let key = SessionKey::new(project, version);
    sessions.teardown(&key, Strictness::BestEffort).await?;
    apply_locked(sessions, lock, key, environment, Lifetime::Persistent).await
}

/// Install the pins for `environment` at the key's version into the session
/// for `key`, then apply `lifetime`.
pub async fn apply_locked(
    sessions: &SessionManager,
    lock: &LockFile,
    key: SessionKey,
    environment: &str,
    lifetime: Lifetime,
) -> crate::Result<()> {
    let packages = lock.packages(environment, &key.version)?;
    let pins: Vec<String> = packages.iter().map(|p| shell_quote(&p.pin())).collect();

    let lease = sessions.acquire(key, lifetime).await?;
    if pins.is_empty() {
        tracing::info!("Nothing locked for {environment}, skipping install");
        return lease.release().await;
    }

    tracing::info!(
        "Installing {} packages for {environment} into {}",
        pins.len(),
        lease.key()
    );
    let outcome = lease
        .execute(&format!("python -m pip install {}", pins.join(" ")))
        .await;
    lease.release_with(outcome).await?;
    Ok(())
}
