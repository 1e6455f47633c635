//! Conversion of JSON-RPC results into the chain data model.

use std::sync::Arc;

use alloy_primitives::U256;
use serde_json::Value;

use chainql_core::{Block, ChainError, LogEntry, Transaction};

fn invalid(msg: impl Into<String>) -> ChainError {
    ChainError::InvalidResponse(msg.into())
}

fn field<'a>(v: &'a Value, name: &str) -> Result<&'a str, ChainError> {
    v[name].as_str().ok_or_else(|| invalid(format!("missing field '{name}'")))
}

/// Parse a hex quantity (`0x1a`).
pub fn parse_quantity(s: &str) -> Result<u128, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| invalid(format!("bad quantity '{s}': {e}")))
}

pub fn parse_u64(s: &str) -> Result<u64, ChainError> {
    let n = parse_quantity(s)?;
    u64::try_from(n).map_err(|_| invalid(format!("quantity '{s}' exceeds u64")))
}

/// A 256-bit hex quantity as a decimal string.
pub fn parse_decimal(s: &str) -> Result<String, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok("0".into());
    }
    U256::from_str_radix(digits, 16)
        .map(|u| u.to_string())
        .map_err(|e| invalid(format!("bad quantity '{s}': {e}")))
}

pub fn parse_data(s: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| invalid(format!("bad hex data: {e}")))
}

pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// Build a [`Block`] from an `eth_getBlockByNumber(_, true)` result.
/// Transactions carry no logs yet.
pub fn block_from_json(v: &Value) -> Result<Block, ChainError> {
    let transactions = v["transactions"]
        .as_array()
        .map(|txs| txs.iter().map(tx_from_json).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(Block {
        number: parse_u64(field(v, "number")?)?,
        hash: field(v, "hash")?.to_string(),
        parent_hash: field(v, "parentHash")?.to_string(),
        timestamp: parse_u64(field(v, "timestamp")?)? as i64,
        miner: v["miner"].as_str().unwrap_or_default().to_string(),
        gas_used: parse_quantity(v["gasUsed"].as_str().unwrap_or("0x0"))?,
        gas_limit: parse_quantity(v["gasLimit"].as_str().unwrap_or("0x0"))?,
        transactions: transactions.into_iter().map(Arc::new).collect(),
    })
}

pub fn tx_from_json(v: &Value) -> Result<Transaction, ChainError> {
    if v.is_string() {
        return Err(invalid("block was fetched without full transaction objects"));
    }
    Ok(Transaction {
        hash: field(v, "hash")?.to_string(),
        block_number: parse_u64(field(v, "blockNumber")?)?,
        transaction_index: parse_u64(field(v, "transactionIndex")?)?,
        from: field(v, "from")?.to_string(),
        to: v["to"].as_str().map(str::to_string),
        value: parse_decimal(v["value"].as_str().unwrap_or("0x0"))?,
        gas: parse_quantity(v["gas"].as_str().unwrap_or("0x0"))?,
        // Type-2 transactions may omit gasPrice in some clients.
        gas_price: parse_quantity(v["gasPrice"].as_str().unwrap_or("0x0"))?,
        nonce: parse_u64(v["nonce"].as_str().unwrap_or("0x0"))?,
        input: v["input"].as_str().unwrap_or("0x").to_string(),
        logs: Vec::new(),
    })
}

pub fn log_from_json(v: &Value) -> Result<LogEntry, ChainError> {
    let topics = v["topics"]
        .as_array()
        .ok_or_else(|| invalid("missing field 'topics'"))?
        .iter()
        .map(|t| t.as_str().map(str::to_string).ok_or_else(|| invalid("non-string topic")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LogEntry {
        address: field(v, "address")?.to_string(),
        topics,
        data: parse_data(v["data"].as_str().unwrap_or("0x"))?,
        block_number: parse_u64(field(v, "blockNumber")?)?,
        transaction_hash: field(v, "transactionHash")?.to_string(),
        transaction_index: parse_u64(field(v, "transactionIndex")?)?,
        log_index: parse_u64(field(v, "logIndex")?)?,
        removed: v["removed"].as_bool().unwrap_or(false),
    })
}

/// Attach logs to the transactions that emitted them, in log-index order.
pub fn attach_logs(block: &mut Block, mut logs: Vec<LogEntry>) {
    logs.sort_by_key(|log| log.log_index);
    for tx in block.transactions.iter_mut() {
        let own: Vec<Arc<LogEntry>> = logs
            .iter()
            .filter(|log| log.transaction_hash.eq_ignore_ascii_case(&tx.hash))
            .cloned()
            .map(Arc::new)
            .collect();
        if !own.is_empty() {
            Arc::make_mut(tx).logs = own;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_json() -> Value {
        json!({
            "number": "0x10",
            "hash": "0xb10c",
            "parentHash": "0xb10b",
            "timestamp": "0x6553f100",
            "miner": "0x00000000000000000000000000000000000000aa",
            "gasUsed": "0x5208",
            "gasLimit": "0x1c9c380",
            "transactions": [
                {
                    "hash": "0xt1",
                    "blockNumber": "0x10",
                    "transactionIndex": "0x0",
                    "from": "0x00000000000000000000000000000000000000bb",
                    "to": null,
                    "value": "0xde0b6b3a7640000",
                    "gas": "0x5208",
                    "gasPrice": "0x3b9aca00",
                    "nonce": "0x2",
                    "input": "0x"
                },
                {
                    "hash": "0xt2",
                    "blockNumber": "0x10",
                    "transactionIndex": "0x1",
                    "from": "0x00000000000000000000000000000000000000bb",
                    "to": "0x00000000000000000000000000000000000000cc",
                    "value": "0x0",
                    "gas": "0x5208",
                    "nonce": "0x3",
                    "input": "0xa9059cbb"
                }
            ]
        })
    }

    fn log_json(tx: &str, index: u64) -> Value {
        json!({
            "address": "0x00000000000000000000000000000000000000cc",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x01f4",
            "blockNumber": "0x10",
            "transactionHash": tx,
            "transactionIndex": "0x1",
            "logIndex": to_quantity(index),
            "removed": false
        })
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0xff").unwrap(), 255);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_u64("0x10000000000000000").is_err());
        assert_eq!(
            parse_decimal("0x10000000000000000000000000000000000").unwrap(),
            "87112285931760246646623899502532662132736"
        );
        assert_eq!(to_quantity(255), "0xff");
    }

    #[test]
    fn block_with_transactions() {
        let block = block_from_json(&block_json()).unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.timestamp, 1_700_000_000);
        assert_eq!(block.gas_used, 21_000);
        assert_eq!(block.transactions.len(), 2);

        let creation = &block.transactions[0];
        assert_eq!(creation.to, None);
        assert_eq!(creation.value, "1000000000000000000");
        assert_eq!(creation.gas_price, 1_000_000_000);
        assert_eq!(block.transactions[1].gas_price, 0);
        assert_eq!(block.transactions[1].nonce, 3);
    }

    #[test]
    fn hash_only_transactions_are_rejected() {
        let mut json = block_json();
        json["transactions"] = json!(["0xt1"]);
        assert!(block_from_json(&json).is_err());
    }

    #[test]
    fn logs_are_grouped_by_transaction() {
        let mut block = block_from_json(&block_json()).unwrap();
        let logs = vec![
            log_from_json(&log_json("0xt2", 3)).unwrap(),
            log_from_json(&log_json("0xT2", 1)).unwrap(),
        ];
        assert_eq!(logs[0].data, vec![0x01, 0xf4]);

        attach_logs(&mut block, logs);
        assert!(block.transactions[0].logs.is_empty());
        let indexes: Vec<u64> = block.transactions[1].logs.iter().map(|l| l.log_index).collect();
        assert_eq!(indexes, vec![1, 3]);
    }
}
