//! CLI commands.
//!
//! Each command drives the wallet model and writes a human-readable report
//! to `out`. Flow commands wait for their state machine to settle; the
//! per-request timeouts of the backend client bound every wait.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tokio::sync::watch;

use wallet_bus::{EventFilter, WalletEvent};
use wallet_model::{LoadState, PayStatus, UriAction, WithdrawStatus};
use wallet_telemetry::encode_metrics;
use wallet_types::{ContractTerms, HistoryEvent};

use crate::WalletRuntime;

/// Output sink for command reports.
pub type Output<'a> = &'a mut (dyn Write + Send);

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the balance of every currency
    Balance,

    /// List operations the wallet is still working on
    Pending,

    /// Retry pending operations now instead of waiting for the next attempt
    RetryPending,

    /// Show the wallet history, latest first
    History {
        /// Include exchange and reserve bookkeeping events
        #[arg(long)]
        all: bool,
    },

    /// Withdraw money from a bank through a taler://withdraw/ URI
    Withdraw {
        uri: String,

        /// Accept the exchange's terms of service if asked
        #[arg(long)]
        accept_tos: bool,

        /// Exchange to withdraw through instead of the bank's suggestion
        #[arg(long)]
        exchange: Option<String>,
    },

    /// Withdraw demo currency from the test bank
    WithdrawTest,

    /// Pay for an order through a taler://pay/ URI
    Pay {
        uri: String,

        /// Confirm the payment instead of only showing its terms
        #[arg(long)]
        confirm: bool,
    },

    /// Open any taler:// URI
    Open { uri: String },

    /// Delete the wallet database
    Reset,

    /// Print wallet events until interrupted
    Watch {
        /// Print Prometheus metrics when done
        #[arg(long)]
        metrics: bool,
    },
}

/// Run `command` against `runtime`.
pub async fn execute(command: Command, runtime: &WalletRuntime, out: Output<'_>) -> Result<()> {
    match command {
        Command::Balance => balance(runtime, out).await,
        Command::Pending => pending(runtime, out).await,
        Command::RetryPending => {
            runtime.api().request("retryPendingNow", None).await?;
            writeln!(out, "Retrying pending operations")?;
            Ok(())
        }
        Command::History { all } => history(runtime, all, out).await,
        Command::Withdraw {
            uri,
            accept_tos,
            exchange,
        } => {
            runtime.model().withdraw().get_withdrawal_info(uri);
            finish_withdrawal(runtime, accept_tos, exchange, out).await
        }
        Command::WithdrawTest => {
            let withdraw = runtime.model().withdraw();
            writeln!(out, "Withdrawing test currency...")?;
            withdraw
                .withdraw_test_kudos()
                .await
                .context("Test withdrawal task failed")?;
            writeln!(out, "Test withdrawal done")?;
            Ok(())
        }
        Command::Pay { uri, confirm } => {
            runtime.model().payment().prepare_pay(uri);
            finish_payment(runtime, confirm, out).await
        }
        Command::Open { uri } => match runtime.model().open_uri(&uri)? {
            UriAction::Payment(_) => finish_payment(runtime, false, out).await,
            UriAction::Withdrawal(_) => finish_withdrawal(runtime, false, None, out).await,
            UriAction::RefundUnsupported(_) => {
                writeln!(out, "Refunds are not yet implemented")?;
                Ok(())
            }
        },
        Command::Reset => {
            runtime.api().request("reset", None).await?;
            runtime.model().balances().reset();
            writeln!(out, "Wallet database deleted")?;
            Ok(())
        }
        Command::Watch { metrics } => {
            watch_events(runtime, metrics, out, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
    }
}

fn settle_limit(runtime: &WalletRuntime) -> Duration {
    runtime.config().bridge.default_timeout * 3
}

/// Wait until `rx` holds a value `done` accepts.
async fn settle<S: Clone>(
    mut rx: watch::Receiver<S>,
    limit: Duration,
    done: impl FnMut(&S) -> bool,
) -> Result<S> {
    let state = tokio::time::timeout(limit, rx.wait_for(done))
        .await
        .context("Timed out waiting for the wallet")?
        .context("Wallet state is gone")?;
    Ok(state.clone())
}

async fn balance(runtime: &WalletRuntime, out: Output<'_>) -> Result<()> {
    let balances = runtime.model().balances();
    balances.refresh();
    let state = settle(balances.state(), settle_limit(runtime), |s| {
        !matches!(s, LoadState::NotLoaded)
    })
    .await?;

    match state {
        LoadState::Loaded(balances) if balances.by_currency.is_empty() => {
            writeln!(out, "No balances")?;
        }
        LoadState::Loaded(balances) => {
            for entry in balances.by_currency {
                if entry.pending_incoming.is_zero() {
                    writeln!(out, "{}", entry.available)?;
                } else {
                    writeln!(out, "{} (+{} incoming)", entry.available, entry.pending_incoming)?;
                }
            }
        }
        LoadState::Failed(diagnostic) => bail!("Failed to load balances: {diagnostic}"),
        LoadState::NotLoaded => bail!("Balances not loaded"),
    }
    Ok(())
}

async fn pending(runtime: &WalletRuntime, out: Output<'_>) -> Result<()> {
    let pending = runtime.model().pending_operations();
    pending.refresh();
    let state = settle(pending.state(), settle_limit(runtime), |s| {
        !matches!(s, LoadState::NotLoaded)
    })
    .await?;

    let operations = match state {
        LoadState::Loaded(operations) => operations,
        LoadState::Failed(diagnostic) => bail!("Failed to load pending operations: {diagnostic}"),
        LoadState::NotLoaded => bail!("Pending operations not loaded"),
    };
    writeln!(out, "{} pending operation(s)", operations.len())?;
    for operation in &operations.pending_operations {
        if operation.gives_lifeness {
            writeln!(out, "- {} (active)", operation.op_type)?;
        } else {
            writeln!(out, "- {}", operation.op_type)?;
        }
    }
    Ok(())
}

async fn history(runtime: &WalletRuntime, show_all: bool, out: Output<'_>) -> Result<()> {
    let events = runtime.model().history().load_history(show_all).await?;
    if events.is_empty() {
        writeln!(out, "No history")?;
    }
    for event in &events {
        writeln!(out, "{}", describe_history_event(event))?;
    }
    Ok(())
}

fn describe_history_event(event: &HistoryEvent) -> String {
    let line = match event {
        HistoryEvent::ExchangeAdded(e) => format!("exchange added    {}", e.exchange_base_url),
        HistoryEvent::ExchangeUpdated(e) => format!("exchange updated  {}", e.exchange_base_url),
        HistoryEvent::ReserveBalanceUpdated(e) => {
            format!("reserve balance   {}", e.amount_reserve_balance)
        }
        HistoryEvent::Withdrawn(e) => format!(
            "withdrawn         {} from {}",
            e.amount_withdrawn_effective, e.exchange_base_url
        ),
        HistoryEvent::OrderAccepted(e) => format!(
            "order accepted    {} {}",
            e.order_short_info.amount, e.order_short_info.summary
        ),
        HistoryEvent::OrderRefused(e) => format!(
            "order refused     {} {}",
            e.order_short_info.amount, e.order_short_info.summary
        ),
        HistoryEvent::PaymentSent(e) => format!(
            "payment sent      {} {}",
            e.amount_paid_with_fees, e.order_short_info.summary
        ),
        HistoryEvent::Refreshed(e) => format!("refreshed         {}", e.amount_refreshed_effective),
        HistoryEvent::Unknown => "unknown event".to_string(),
    };
    match event.timestamp() {
        Some(timestamp) => format!("[{}] {line}", timestamp.ms),
        None => line,
    }
}

async fn finish_withdrawal(
    runtime: &WalletRuntime,
    accept_tos: bool,
    exchange: Option<String>,
    out: Output<'_>,
) -> Result<()> {
    let withdraw = runtime.model().withdraw();
    let limit = settle_limit(runtime);
    let loaded = |s: &WithdrawStatus| !matches!(s, WithdrawStatus::Loading(_));

    let mut status = settle(withdraw.status(), limit, loaded).await?;
    if let WithdrawStatus::TermsReviewRequired {
        exchange, tos_text, ..
    } = &status
    {
        writeln!(out, "Exchange {exchange} asks you to accept its terms of service:\n")?;
        writeln!(out, "{tos_text}\n")?;
        if !accept_tos {
            writeln!(out, "Re-run with --accept-tos to accept them.")?;
            return Ok(());
        }
        withdraw.accept_current_terms_of_service()?;
        status = settle(withdraw.status(), limit, loaded).await?;
    }

    match status {
        WithdrawStatus::DetailsReady {
            uri,
            amount,
            exchange: suggested,
        } => {
            let exchange = exchange.unwrap_or(suggested);
            writeln!(out, "Withdrawing {amount} through {exchange}")?;
            withdraw.accept_withdrawal(uri, exchange)?;
            let done = settle(withdraw.status(), limit, |s| {
                matches!(s, WithdrawStatus::Succeeded | WithdrawStatus::Failed(_))
            })
            .await?;
            if let WithdrawStatus::Failed(diagnostic) = done {
                bail!("Withdrawal failed: {diagnostic}");
            }
            writeln!(out, "Withdrawal accepted, confirm it with your bank if asked")?;
            Ok(())
        }
        WithdrawStatus::Failed(diagnostic) => bail!("Withdrawal failed: {diagnostic}"),
        other => bail!("Withdrawal stopped in unexpected state {other:?}"),
    }
}

async fn finish_payment(runtime: &WalletRuntime, confirm: bool, out: Output<'_>) -> Result<()> {
    let payment = runtime.model().payment();
    let limit = settle_limit(runtime);
    let status = settle(payment.status(), limit, |s| *s != PayStatus::Loading).await?;

    match status {
        PayStatus::Prepared {
            contract_terms,
            proposal_id,
            total_fees,
        } => {
            describe_contract(&contract_terms, out)?;
            writeln!(out, "Fees: {total_fees}")?;
            if !confirm {
                writeln!(out, "Re-run with --confirm to pay.")?;
                return Ok(());
            }
            payment.confirm_pay(proposal_id);
            let done = settle(payment.status(), limit, |s| {
                matches!(s, PayStatus::Success | PayStatus::Error(_))
            })
            .await?;
            if let PayStatus::Error(message) = done {
                bail!("Payment failed: {message}");
            }
            writeln!(out, "Payment successful")?;
            Ok(())
        }
        PayStatus::AlreadyPaid(contract_terms) => {
            describe_contract(&contract_terms, out)?;
            writeln!(out, "You already paid for this order.")?;
            Ok(())
        }
        PayStatus::InsufficientBalance(contract_terms) => {
            describe_contract(&contract_terms, out)?;
            bail!("Insufficient balance to pay {}", contract_terms.amount)
        }
        PayStatus::Error(message) => bail!("Payment failed: {message}"),
        other => bail!("Payment stopped in unexpected state {other:?}"),
    }
}

fn describe_contract(terms: &ContractTerms, out: Output<'_>) -> Result<()> {
    writeln!(out, "{}", terms.summary)?;
    writeln!(out, "Amount: {}", terms.amount)?;
    for product in &terms.products {
        match product.total_price() {
            Ok(total) if product.quantity > 1 => {
                writeln!(out, "  {} x {} = {total}", product.quantity, product.description)?
            }
            _ => writeln!(out, "  {} {}", product.description, product.price)?,
        }
    }
    Ok(())
}

/// Print bus events until `stop` resolves or the bus closes.
pub async fn watch_events(
    runtime: &WalletRuntime,
    metrics: bool,
    out: Output<'_>,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    let mut events = runtime.api().bus().subscribe(EventFilter::all());
    writeln!(out, "Watching wallet events (Ctrl+C to stop)")?;

    tokio::pin!(stop);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => writeln!(out, "{}", describe_wallet_event(&event))?,
                None => break,
            },
            () = &mut stop => break,
        }
    }

    if metrics {
        write!(out, "{}", encode_metrics()?)?;
    }
    Ok(())
}

fn describe_wallet_event(event: &WalletEvent) -> String {
    match event {
        WalletEvent::Notification => "notification".to_string(),
        WalletEvent::BackendConnected => "backend connected".to_string(),
        WalletEvent::BackendDisconnected => "backend disconnected".to_string(),
        WalletEvent::TunnelRequest(request) => format!("tunnel request {request}"),
    }
}
