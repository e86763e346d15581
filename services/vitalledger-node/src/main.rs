mod cli;
mod replay;

use anyhow::{Context, Result};
use cli::{Command, Invocation};
use serde::Serialize;
use std::process::ExitCode;
use tracing::info;
use vitalledger_core::{logging, CallContext, Config};
use vitalledger_registry::{AccessError, AccessRegistry};

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

/// One line of JSON on stdout per invocation.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum Receipt {
    Ok {
        ok: serde_json::Value,
    },
    Err {
        /// Stable error code, `null` for storage failures
        err: Option<u32>,
        message: String,
    },
}

impl Receipt {
    fn ok(value: impl Serialize) -> Result<Self> {
        Ok(Receipt::Ok {
            ok: serde_json::to_value(value)?,
        })
    }

    fn is_ok(&self) -> bool {
        matches!(self, Receipt::Ok { .. })
    }
}

impl From<AccessError> for Receipt {
    fn from(e: AccessError) -> Self {
        Receipt::Err {
            err: e.code(),
            message: e.to_string(),
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        return match serde_json::to_string(&handshake) {
            Ok(line) => {
                println!("{}", line);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("[vitalledger-node] error: {}", e);
                ExitCode::from(2)
            }
        };
    }

    match run(&args) {
        Ok(receipt) => {
            match serde_json::to_string(&receipt) {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    eprintln!("[vitalledger-node] error: {}", e);
                    return ExitCode::from(2);
                }
            }
            if receipt.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("[vitalledger-node] error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &[String]) -> Result<Receipt> {
    let invocation = cli::parse(args)?;

    let config = Config::from_file(&invocation.config_path).with_context(|| {
        format!(
            "failed to load config from {}",
            invocation.config_path.display()
        )
    })?;
    logging::init_from_config(&config.logging);

    info!(
        node_id = %config.registry.node_id,
        command = invocation.command.name(),
        "vitalledger-node started"
    );

    let mut registry = AccessRegistry::open(&config.registry).with_context(|| {
        format!(
            "failed to open registry at {}",
            config.registry.database_path.display()
        )
    })?;

    execute(&mut registry, &invocation)
}

/// Run one command. Registry rejections become error receipts; only
/// argument, authentication, replay and serialization failures surface as
/// `Err`.
fn execute(registry: &mut AccessRegistry, invocation: &Invocation) -> Result<Receipt> {
    let height = invocation.height.unwrap_or_default();

    let caller_ctx = match &invocation.caller {
        Some(arg) => {
            let caller = arg.resolve(&invocation.command, height)?;
            if arg.is_signed() && invocation.command.needs_caller() {
                replay::ensure_fresh(registry, &caller, height)
                    .context("signed command refused")?;
            }
            Some(CallContext::new(caller, height))
        }
        None => None,
    };
    let ctx = || caller_ctx.as_ref().context("command requires a caller");

    let outcome = match &invocation.command {
        Command::RegisterIdentity => registry.register_identity(ctx()?),
        Command::RegisterEndpoint {
            device_id,
            device_type,
        } => registry.register_endpoint(ctx()?, device_id, device_type),
        Command::AuthorizeConsumer { consumer, category } => {
            registry.authorize_consumer(ctx()?, consumer, category)
        }
        Command::GrantDomainAccess {
            consumer,
            domain,
            expires_in,
        } => registry.grant_domain_access(ctx()?, consumer, domain, *expires_in),
        Command::RevokeDomainAccess { consumer, domain } => {
            registry.revoke_domain_access(ctx()?, consumer, domain)
        }
        Command::CheckDataAccess {
            owner,
            consumer,
            domain,
        } => registry.check_data_access(owner, consumer, domain, height),
        Command::AuditTrail { from, limit } => {
            return match registry.audit_trail(*from, *limit) {
                Ok(events) => Receipt::ok(events),
                Err(e) => Ok(e.into()),
            };
        }
        Command::Health => return Receipt::ok(registry.health()),
    };

    match outcome {
        Ok(value) => Receipt::ok(value),
        Err(e) => Ok(e.into()),
    }
}
