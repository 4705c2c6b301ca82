// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Runebender Sync: inspect and edit glyphs through the live-editing handler

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runebender_sync::run().await
}
