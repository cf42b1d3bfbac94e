use crate::application::wallet::TransactionView;
use crate::domain::wallet::Wallet;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow {
    user: u64,
    balance: String,
}

#[derive(Serialize)]
struct TransactionRow {
    id: String,
    user: u64,
    method: String,
    amount: String,
    status: String,
}

/// Writes end-of-run reports as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// `user,balance`, one row per wallet.
    pub fn write_balances(&mut self, wallets: impl IntoIterator<Item = Wallet>) -> Result<()> {
        for wallet in wallets {
            self.writer.serialize(BalanceRow {
                user: wallet.user_id,
                balance: wallet.balance.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// `id,user,method,amount,status` with the public status.
    pub fn write_transactions(
        &mut self,
        transactions: impl IntoIterator<Item = TransactionView>,
    ) -> Result<()> {
        for tx in transactions {
            self.writer.serialize(TransactionRow {
                id: tx.id.to_string(),
                user: tx.user_id,
                method: tx.method.to_string(),
                amount: tx.amount.to_string(),
                status: tx.status.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_balances() {
        let mut buf = Vec::new();
        {
            let mut writer = ReportWriter::new(&mut buf);
            let mut wallet = Wallet::new(1);
            wallet.credit("899.50".parse().unwrap()).unwrap();
            writer.write_balances(vec![wallet, Wallet::new(2)]).unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(out, "user,balance\n1,899.50\n2,0.00\n");
    }

    #[test]
    fn test_write_empty_report_has_no_header() {
        let mut buf = Vec::new();
        ReportWriter::new(&mut buf)
            .write_balances(Vec::new())
            .unwrap();
        assert!(buf.is_empty());
    }
}
