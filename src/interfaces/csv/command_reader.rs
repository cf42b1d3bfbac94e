use crate::domain::money::Amount;
use crate::domain::transaction::{IdempotencyKey, PaymentCommand, PaymentMethod};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum RecordType {
    Deposit,
    Payment,
}

#[derive(Debug, Deserialize)]
struct CommandRecord {
    r#type: RecordType,
    user: u64,
    #[serde(default)]
    method: Option<String>,
    amount: String,
    #[serde(default)]
    key: Option<String>,
}

/// One row of batch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    /// Provision funds into a wallet.
    Deposit { user_id: u64, amount: Amount },
    /// Spend from a wallet through the orchestrator.
    Payment(PaymentCommand),
}

impl TryFrom<CommandRecord> for BatchCommand {
    type Error = PaymentError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let amount: Amount = record.amount.parse()?;
        match record.r#type {
            RecordType::Deposit => Ok(BatchCommand::Deposit {
                user_id: record.user,
                amount,
            }),
            RecordType::Payment => {
                let method: PaymentMethod = record
                    .method
                    .as_deref()
                    .ok_or_else(|| {
                        PaymentError::InvalidCommand("Payment row missing method".to_string())
                    })?
                    .parse()?;
                let key = record.key.map(IdempotencyKey::new).transpose()?;
                Ok(BatchCommand::Payment(PaymentCommand::new(
                    record.user,
                    method,
                    amount,
                    key,
                )))
            }
        }
    }
}

/// Reads batch commands from a CSV source with the header
/// `type, user, method, amount, key`.
///
/// Whitespace is trimmed and short rows are accepted; `method` and `key` may
/// be empty for deposits.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates commands.
    pub fn commands(self) -> impl Iterator<Item = Result<BatchCommand>> {
        self.reader.into_deserialize::<CommandRecord>().map(|result| {
            let record = result.map_err(PaymentError::from)?;
            BatchCommand::try_from(record)
        })
    }
}
