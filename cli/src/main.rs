//! Claw CLI: operate a local voucher ledger.
//!
//! Each invocation loads the ledger state from the data directory, runs one
//! command and writes the state back if the command changed it.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use claw_cli::{ClawConfig, Session};
use claw_ledger::VoucherView;
use claw_store::{FundingReserve, OwnershipRegistry};
use claw_types::{Address, Amount, Timestamp, VoucherId};
use claw_utils::{format_duration, init_logging, LogFormat};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "claw", about = "Bounded-spending voucher ledger")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CLAW_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the persisted ledger state.
    #[arg(long, env = "CLAW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CLAW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CLAW_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Print command output as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ExpiryArgs {
    /// Absolute expiry as unix seconds; 0 means the voucher never expires.
    #[arg(long, conflicts_with = "expires_in")]
    expiry: Option<u64>,

    /// Expiry relative to now, in seconds.
    #[arg(long)]
    expires_in: Option<u64>,
}

impl ExpiryArgs {
    fn resolve(&self, now: Timestamp) -> Option<Timestamp> {
        match (self.expiry, self.expires_in) {
            (Some(0), _) | (None, None) => None,
            (Some(secs), _) => Some(Timestamp::new(secs)),
            (None, Some(delta)) => Some(now.plus_secs(delta)),
        }
    }
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print a default configuration file.
    InitConfig,

    /// Credit an account in the funding reserve.
    Deposit {
        #[arg(long)]
        account: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
    },

    /// Set how much the ledger may pull from an account.
    Approve {
        #[arg(long)]
        account: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
    },

    /// Fund a voucher for one agent.
    Create {
        #[arg(long)]
        funder: Address,
        #[arg(long)]
        agent: Address,
        #[arg(long, value_parser = parse_amount)]
        max_spend: Amount,
        #[command(flatten)]
        expiry: ExpiryArgs,
    },

    /// Fund one voucher per agent, all or none.
    CreateBatch {
        #[arg(long)]
        funder: Address,
        /// Comma-separated agent addresses.
        #[arg(long, value_delimiter = ',', required = true)]
        agents: Vec<Address>,
        #[arg(long, value_parser = parse_amount)]
        max_spend_each: Amount,
        #[command(flatten)]
        expiry: ExpiryArgs,
    },

    /// Pay from a voucher to a recipient.
    Spend {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        voucher: u64,
        #[arg(long)]
        to: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
    },

    /// Pay from a voucher to another agent, with a note.
    Tip {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        voucher: u64,
        #[arg(long)]
        to: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
        #[arg(long, default_value = "")]
        message: String,
    },

    /// Stop all further spending from a voucher.
    Revoke {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        voucher: u64,
    },

    /// Destroy a voucher and refund its unspent balance to the funder.
    Burn {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        voucher: u64,
    },

    /// Hand a voucher to a new holder.
    Transfer {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        voucher: u64,
        #[arg(long)]
        to: Address,
    },

    /// Show one voucher.
    Show {
        #[arg(long)]
        voucher: u64,
    },

    /// List vouchers, optionally filtered by holder or funder.
    List {
        #[arg(long, conflicts_with = "funder")]
        holder: Option<Address>,
        #[arg(long)]
        funder: Option<Address>,
    },

    /// Reserve balance, allowance and held vouchers of an account.
    Balance {
        #[arg(long)]
        account: Address,
    },

    /// Ledger-wide totals.
    Stats,
}

fn parse_amount(s: &str) -> Result<Amount, String> {
    Amount::parse_nominal(s).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => ClawConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClawConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    init_logging(config.log_format, &config.log_level);
    if let Some(ref path) = cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    if let Command::InitConfig = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let session = Session::open(&config.data_dir, config.params.clone())
        .with_context(|| format!("opening state in {}", config.data_dir.display()))?;
    let out = Output { json: cli.json };
    let now = Timestamp::now();

    let dirty = run(&session, &out, cli.command, now)?;
    if dirty {
        session.save().context("saving state")?;
    }
    Ok(())
}

/// Execute one command. Returns whether the state changed.
fn run(session: &Session, out: &Output, command: Command, now: Timestamp) -> anyhow::Result<bool> {
    let ledger = &session.ledger;
    match command {
        Command::InitConfig => Ok(false),

        Command::Deposit { account, amount } => {
            session.reserve.deposit(&account, amount)?;
            out.emit(
                || json!({ "account": account, "balance": session.reserve.balance_of(&account).to_string() }),
                || format!("{} balance: {}", account, session.reserve.balance_of(&account)),
            )?;
            Ok(true)
        }

        Command::Approve { account, amount } => {
            session.reserve.approve(&account, amount);
            out.emit(
                || json!({ "account": account, "allowance": amount.to_string() }),
                || format!("{} allowance: {}", account, amount),
            )?;
            Ok(true)
        }

        Command::Create {
            funder,
            agent,
            max_spend,
            expiry,
        } => {
            let id = ledger.create(&funder, &agent, max_spend, expiry.resolve(now))?;
            out.emit(|| json!({ "voucher": id.raw() }), || {
                format!("created voucher {id} for {agent} ({max_spend})")
            })?;
            Ok(true)
        }

        Command::CreateBatch {
            funder,
            agents,
            max_spend_each,
            expiry,
        } => {
            let ids = ledger.create_batch(&funder, &agents, max_spend_each, expiry.resolve(now))?;
            let raw: Vec<u64> = ids.iter().map(|id| id.raw()).collect();
            out.emit(|| json!({ "vouchers": raw }), || {
                let list: Vec<String> = ids.iter().map(ToString::to_string).collect();
                format!("created {} vouchers: {}", ids.len(), list.join(", "))
            })?;
            Ok(true)
        }

        Command::Spend {
            caller,
            voucher,
            to,
            amount,
        } => {
            let id = VoucherId::new(voucher);
            ledger.spend(&caller, id, &to, amount)?;
            let remaining = ledger.get_remaining(id)?;
            out.emit(
                || json!({ "voucher": voucher, "remaining": remaining.to_string() }),
                || format!("paid {amount} to {to} from {id}; {remaining} left"),
            )?;
            Ok(true)
        }

        Command::Tip {
            caller,
            voucher,
            to,
            amount,
            message,
        } => {
            let id = VoucherId::new(voucher);
            ledger.tip(&caller, id, &to, amount, &message)?;
            let remaining = ledger.get_remaining(id)?;
            out.emit(
                || json!({ "voucher": voucher, "remaining": remaining.to_string() }),
                || format!("tipped {amount} to {to} from {id}; {remaining} left"),
            )?;
            Ok(true)
        }

        Command::Revoke { caller, voucher } => {
            let id = VoucherId::new(voucher);
            ledger.revoke(&caller, id)?;
            out.emit(|| json!({ "voucher": voucher, "revoked": true }), || {
                format!("revoked {id}")
            })?;
            Ok(true)
        }

        Command::Burn { caller, voucher } => {
            let id = VoucherId::new(voucher);
            let refunded = ledger.burn(&caller, id)?;
            out.emit(
                || json!({ "voucher": voucher, "refunded": refunded.to_string() }),
                || format!("burned {id}, refunded {refunded}"),
            )?;
            Ok(true)
        }

        Command::Transfer { caller, voucher, to } => {
            let id = VoucherId::new(voucher);
            session.ownership.transfer(id, &caller, &to)?;
            out.emit(|| json!({ "voucher": voucher, "holder": to }), || {
                format!("{id} now held by {to}")
            })?;
            Ok(true)
        }

        Command::Show { voucher } => {
            let view = ledger.voucher(VoucherId::new(voucher))?;
            out.emit(|| &view, || describe(&view, now))?;
            Ok(false)
        }

        Command::List { holder, funder } => {
            let ids = match (holder, funder) {
                (Some(owner), _) => ledger.vouchers_held_by(&owner),
                (None, Some(funder)) => ledger.vouchers_funded_by(&funder),
                (None, None) => ledger.voucher_ids(),
            };
            let views = ids
                .into_iter()
                .map(|id| ledger.voucher(id))
                .collect::<Result<Vec<_>, _>>()?;
            out.emit(|| &views, || {
                if views.is_empty() {
                    return "no vouchers".to_string();
                }
                views
                    .iter()
                    .map(|v| {
                        format!(
                            "{:<6} {:<15} {:>12} / {:<12} {:?}",
                            v.id.to_string(),
                            v.holder.map_or_else(|| "-".to_string(), |h| h.short()),
                            v.remaining.to_string(),
                            v.max_spend.to_string(),
                            v.status,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            Ok(false)
        }

        Command::Balance { account } => {
            let balance = session.reserve.balance_of(&account);
            let allowance = session.reserve.allowance(&account);
            let held: Vec<u64> = ledger
                .vouchers_held_by(&account)
                .iter()
                .map(|id| id.raw())
                .collect();
            out.emit(
                || json!({
                    "account": account,
                    "balance": balance.to_string(),
                    "allowance": allowance.to_string(),
                    "vouchers": held,
                }),
                || {
                    format!(
                        "balance:   {balance}\nallowance: {allowance}\nvouchers:  {}",
                        ledger.balance_of(&account)
                    )
                },
            )?;
            Ok(false)
        }

        Command::Stats => {
            let pooled = session.reserve.pooled();
            let outstanding = ledger.outstanding();
            out.emit(
                || json!({
                    "live_vouchers": ledger.total_supply(),
                    "issued": ledger.total_issued(),
                    "outstanding": outstanding.to_string(),
                    "pooled": pooled.to_string(),
                    "reserve_supply": session.reserve.total_supply().to_string(),
                }),
                || {
                    format!(
                        "live vouchers: {}\nissued:        {}\noutstanding:   {outstanding}\npooled:        {pooled}",
                        ledger.total_supply(),
                        ledger.total_issued(),
                    )
                },
            )?;
            Ok(false)
        }
    }
}

fn describe(view: &VoucherView, now: Timestamp) -> String {
    let expiry = match view.expiry {
        None => "never".to_string(),
        Some(at) if at.is_passed(now) => format!("{} (passed)", at.as_secs()),
        Some(at) => format!("{} (in {})", at.as_secs(), format_duration(at.secs_until(now))),
    };
    let holder = view
        .holder
        .map_or_else(|| "-".to_string(), |h| h.to_string());
    format!(
        "voucher   {}\nstatus    {:?}\nfunder    {}\nholder    {}\nspent     {} / {} ({}%)\nremaining {}\nexpires   {}",
        view.id,
        view.status,
        view.funder,
        holder,
        view.spent,
        view.max_spend,
        view.percent_used(),
        view.remaining,
        expiry,
    )
}

struct Output {
    json: bool,
}

impl Output {
    /// Print one result. Only the representation that is asked for is built.
    fn emit<T: Serialize>(
        &self,
        json: impl FnOnce() -> T,
        human: impl FnOnce() -> String,
    ) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(&json())?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}
