//! Application layer containing the payment orchestration logic.
//!
//! `PaymentOrchestrator` is the entry point for spending from a wallet,
//! `Reconciler` settles whatever the synchronous path had to defer, and
//! `WalletService` serves balance and history reads.

pub mod orchestrator;
pub mod reconciler;
pub mod wallet;
