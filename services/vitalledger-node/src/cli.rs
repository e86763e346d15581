//! Command-line parsing for the node.
//!
//! `vitalledger-node --config <path> <command> [--flag value]...`
//!
//! A signed caller (`--public-key`/`--signature`) signs the JSON returned by
//! [`Command::signing_payload`], for example:
//!
//! ```text
//! {"command":{"name":"grant-domain-access","consumer":"wallet_2","domain":"cardiac-metrics","expires_in":500},"height":7}
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use vitalledger_core::{BlockHeight, Principal};

pub const DEFAULT_AUDIT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Command {
    RegisterIdentity,
    RegisterEndpoint {
        device_id: String,
        device_type: String,
    },
    AuthorizeConsumer {
        consumer: Principal,
        category: String,
    },
    GrantDomainAccess {
        consumer: Principal,
        domain: String,
        expires_in: Option<u64>,
    },
    RevokeDomainAccess {
        consumer: Principal,
        domain: String,
    },
    CheckDataAccess {
        owner: Principal,
        consumer: Principal,
        domain: String,
    },
    AuditTrail {
        from: u64,
        limit: usize,
    },
    Health,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterIdentity => "register-identity",
            Command::RegisterEndpoint { .. } => "register-endpoint",
            Command::AuthorizeConsumer { .. } => "authorize-consumer",
            Command::GrantDomainAccess { .. } => "grant-domain-access",
            Command::RevokeDomainAccess { .. } => "revoke-domain-access",
            Command::CheckDataAccess { .. } => "check-data-access",
            Command::AuditTrail { .. } => "audit-trail",
            Command::Health => "health",
        }
    }

    /// Bytes a signed caller signs: the command with every argument, and the
    /// height it is meant to run at.
    pub fn signing_payload(&self, height: BlockHeight) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SignedCall<'a> {
            command: &'a Command,
            height: BlockHeight,
        }

        serde_json::to_vec(&SignedCall {
            command: self,
            height,
        })
        .context("failed to encode signing payload")
    }

    /// Whether the command mutates state on behalf of a caller.
    pub fn needs_caller(&self) -> bool {
        !matches!(
            self,
            Command::CheckDataAccess { .. } | Command::AuditTrail { .. } | Command::Health
        )
    }
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerArg {
    /// `--caller <principal>`, trusted as given
    Named(Principal),
    /// `--public-key <hex> --signature <hex>` over [`Command::signing_payload`]
    Signed {
        public_key: Vec<u8>,
        signature: Vec<u8>,
    },
}

impl CallerArg {
    pub fn resolve(&self, command: &Command, height: BlockHeight) -> Result<Principal> {
        match self {
            CallerArg::Named(principal) => Ok(principal.clone()),
            CallerArg::Signed {
                public_key,
                signature,
            } => {
                let payload = command.signing_payload(height)?;
                Principal::authenticate(public_key, &payload, signature)
                    .context("caller authentication failed")
            }
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, CallerArg::Signed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: PathBuf,
    pub command: Command,
    pub caller: Option<CallerArg>,
    pub height: Option<BlockHeight>,
}

struct Flags<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Flags<'a> {
    fn optional(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).copied()
    }

    fn required(&self, name: &str) -> Result<&'a str> {
        self.optional(name)
            .ok_or_else(|| anyhow!("missing required --{} <value> argument", name))
    }

    fn principal(&self, name: &str) -> Result<Principal> {
        let raw = self.required(name)?;
        Principal::parse(raw).with_context(|| format!("invalid --{}", name))
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.optional(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| anyhow!("--{} must be a non-negative integer, got {:?}", name, raw))
            })
            .transpose()
    }

    fn hex(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.optional(name)
            .map(|raw| hex::decode(raw).with_context(|| format!("--{} must be hex", name)))
            .transpose()
    }
}

/// Parse process arguments (including `argv[0]`).
pub fn parse(args: &[String]) -> Result<Invocation> {
    let mut positional = Vec::new();
    let mut values = HashMap::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--{} was provided without a value", name))?;
            if values.insert(name, value.as_str()).is_some() {
                bail!("--{} was provided more than once", name);
            }
        } else {
            positional.push(arg.as_str());
        }
    }

    let flags = Flags { values };

    let config_path = PathBuf::from(
        flags
            .optional("config")
            .ok_or_else(|| anyhow!("missing required --config <path> argument"))?,
    );

    let name = match positional.as_slice() {
        [name] => *name,
        [] => bail!("missing command"),
        [_, extra, ..] => bail!("unexpected argument {:?}", extra),
    };

    let command = match name {
        "register-identity" => Command::RegisterIdentity,
        "register-endpoint" => Command::RegisterEndpoint {
            device_id: flags.required("device-id")?.to_string(),
            device_type: flags.required("device-type")?.to_string(),
        },
        "authorize-consumer" => Command::AuthorizeConsumer {
            consumer: flags.principal("consumer")?,
            category: flags.required("category")?.to_string(),
        },
        "grant-domain-access" => Command::GrantDomainAccess {
            consumer: flags.principal("consumer")?,
            domain: flags.required("domain")?.to_string(),
            expires_in: flags.number("expires-in")?,
        },
        "revoke-domain-access" => Command::RevokeDomainAccess {
            consumer: flags.principal("consumer")?,
            domain: flags.required("domain")?.to_string(),
        },
        "check-data-access" => Command::CheckDataAccess {
            owner: flags.principal("owner")?,
            consumer: flags.principal("consumer")?,
            domain: flags.required("domain")?.to_string(),
        },
        "audit-trail" => Command::AuditTrail {
            from: flags.number("from")?.unwrap_or(1),
            limit: flags.number("limit")?.unwrap_or(DEFAULT_AUDIT_LIMIT),
        },
        "health" => Command::Health,
        other => bail!("unknown command {:?}", other),
    };

    let caller = match (
        flags.optional("caller"),
        flags.hex("public-key")?,
        flags.hex("signature")?,
    ) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            bail!("--caller cannot be combined with --public-key/--signature")
        }
        (Some(_), None, None) => Some(CallerArg::Named(flags.principal("caller")?)),
        (None, Some(public_key), Some(signature)) => Some(CallerArg::Signed {
            public_key,
            signature,
        }),
        (None, Some(_), None) => bail!("--public-key requires --signature"),
        (None, None, Some(_)) => bail!("--signature requires --public-key"),
        (None, None, None) => None,
    };

    if command.needs_caller() && caller.is_none() {
        bail!("{} requires --caller or --public-key/--signature", command.name());
    }

    let height = flags
        .number("height")?
        .map(BlockHeight::new)
        .transpose()
        .context("invalid --height")?;

    let needs_height = command.needs_caller() || matches!(command, Command::CheckDataAccess { .. });
    if needs_height && height.is_none() {
        bail!("{} requires --height <block>", command.name());
    }

    Ok(Invocation {
        config_path,
        command,
        caller,
        height,
    })
}
