// =============================================================================
// Gateway Codec — Deriv WebSocket API v3 payloads
// =============================================================================
//
// Outbound: pure builders for the authorize, candle-history and tick
// subscription requests.
//
// Inbound: every frame is classified into zero or more `GatewayEvent`s before
// any state is touched. The gateway routinely combines keys in one frame
// (`candles` + `subscription`, `tick` + `subscription`), so every recognised
// top-level key yields its own event, in a fixed order. A frame with none of
// the known keys decodes to an empty list.
// =============================================================================

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::market_data::Candle;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// `{ "authorize": token }`
pub fn authorize_request(token: &str) -> String {
    json!({ "authorize": token }).to_string()
}

/// Candle history for the latest `count` bars, with live `ohlc` updates.
pub fn candle_history_request(symbol: &str, granularity_seconds: u32, count: usize) -> String {
    json!({
        "ticks_history": symbol,
        "adjust_start_time": 1,
        "count": count,
        "end": "latest",
        "granularity": granularity_seconds,
        "style": "candles",
        "subscribe": 1,
    })
    .to_string()
}

/// `{ "ticks": symbol, "subscribe": 1 }`
pub fn tick_subscribe_request(symbol: &str) -> String {
    json!({ "ticks": symbol, "subscribe": 1 }).to_string()
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A typed inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Authorize { balance: Option<f64> },
    Balance { balance: Option<f64> },
    Candles(Vec<Candle>),
    Ohlc(Candle),
    Tick { quote: f64, time: DateTime<Utc> },
    Subscription { id: String },
    Error { code: Option<String>, message: String },
}

/// Decode one text frame.
///
/// Fails on invalid JSON, a non-object root, or a recognised key whose body
/// is malformed; in that case nothing from the frame should be applied.
pub fn decode(text: &str) -> Result<Vec<GatewayEvent>> {
    let root: Value = serde_json::from_str(text).context("failed to parse gateway JSON")?;
    let obj = root
        .as_object()
        .context("gateway message is not a JSON object")?;

    let mut events = Vec::new();

    if let Some(auth) = present(obj, "authorize") {
        events.push(GatewayEvent::Authorize {
            balance: optional_f64(auth.get("balance")),
        });
    }

    if let Some(bal) = present(obj, "balance") {
        events.push(GatewayEvent::Balance {
            balance: optional_f64(bal.get("balance")),
        });
    }

    if let Some(candles) = present(obj, "candles") {
        let list = candles.as_array().context("candles is not an array")?;
        let parsed = list
            .iter()
            .enumerate()
            .map(|(i, c)| parse_history_candle(c).with_context(|| format!("candles[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        events.push(GatewayEvent::Candles(parsed));
    }

    if let Some(ohlc) = present(obj, "ohlc") {
        events.push(GatewayEvent::Ohlc(parse_ohlc(ohlc).context("ohlc")?));
    }

    if let Some(tick) = present(obj, "tick") {
        let quote = parse_f64(&tick["quote"], "tick.quote")?;
        let epoch = parse_epoch(&tick["epoch"], "tick.epoch")?;
        events.push(GatewayEvent::Tick {
            quote,
            time: epoch_to_datetime(epoch)?,
        });
    }

    if let Some(sub) = present(obj, "subscription") {
        let id = sub["id"]
            .as_str()
            .context("missing field subscription.id")?
            .to_string();
        events.push(GatewayEvent::Subscription { id });
    }

    if let Some(err) = present(obj, "error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error")
            .to_string();
        let code = err.get("code").and_then(Value::as_str).map(str::to_string);
        events.push(GatewayEvent::Error { code, message });
    }

    Ok(events)
}

/// A key counts as present unless it is missing or `null`.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn parse_history_candle(c: &Value) -> Result<Candle> {
    let epoch = parse_epoch(&c["epoch"], "epoch")?;
    Ok(Candle {
        time: epoch.saturating_mul(1000),
        open: parse_f64(&c["open"], "open")?,
        high: parse_f64(&c["high"], "high")?,
        low: parse_f64(&c["low"], "low")?,
        close: parse_f64(&c["close"], "close")?,
    })
}

/// Live bar update. The bar is keyed by `open_time`; `epoch` (the time of the
/// tick that produced the update) is only used when `open_time` is absent.
fn parse_ohlc(o: &Value) -> Result<Candle> {
    let open_time = match o.get("open_time").filter(|v| !v.is_null()) {
        Some(v) => parse_epoch(v, "open_time")?,
        None => parse_epoch(&o["epoch"], "epoch")?,
    };
    Ok(Candle {
        time: open_time.saturating_mul(1000),
        open: parse_f64(&o["open"], "open")?,
        high: parse_f64(&o["high"], "high")?,
        low: parse_f64(&o["low"], "low")?,
        close: parse_f64(&o["close"], "close")?,
    })
}

/// The gateway sends prices either as JSON numbers or as numeric strings.
fn parse_f64(val: &Value, name: &str) -> Result<f64> {
    let parsed = match val {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}"))?,
        Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64"))?,
        Value::Null => bail!("missing field {name}"),
        _ => bail!("field {name} has unexpected JSON type"),
    };
    if !parsed.is_finite() {
        bail!("field {name} is not finite");
    }
    Ok(parsed)
}

fn optional_f64(val: Option<&Value>) -> Option<f64> {
    val.and_then(|v| parse_f64(v, "balance").ok())
}

/// Epoch seconds, as an integer or an integer-valued string.
fn parse_epoch(val: &Value, name: &str) -> Result<i64> {
    match val {
        Value::Number(n) => n
            .as_i64()
            .with_context(|| format!("field {name} is not an integer epoch")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .with_context(|| format!("failed to parse {name} as epoch: {s}")),
        Value::Null => bail!("missing field {name}"),
        _ => bail!("field {name} has unexpected JSON type"),
    }
}

fn epoch_to_datetime(epoch_secs: i64) -> Result<DateTime<Utc>> {
    epoch_secs
        .checked_mul(1000)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .with_context(|| format!("epoch {epoch_secs} is out of range"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_request_shape() {
        let v: Value = serde_json::from_str(&authorize_request("a1-token")).unwrap();
        assert_eq!(v, json!({ "authorize": "a1-token" }));
    }

    #[test]
    fn history_request_shape() {
        let v: Value = serde_json::from_str(&candle_history_request("R_25", 60, 100)).unwrap();
        assert_eq!(
            v,
            json!({
                "ticks_history": "R_25",
                "adjust_start_time": 1,
                "count": 100,
                "end": "latest",
                "granularity": 60,
                "style": "candles",
                "subscribe": 1
            })
        );
    }

    #[test]
    fn tick_request_shape() {
        let v: Value = serde_json::from_str(&tick_subscribe_request("frxXAUUSD")).unwrap();
        assert_eq!(v, json!({ "ticks": "frxXAUUSD", "subscribe": 1 }));
    }

    #[test]
    fn decodes_candle_history_with_subscription() {
        let json = r#"{
            "candles": [
                { "epoch": 1700000000, "open": "101.5", "high": 102, "low": "100.25", "close": "101.75" },
                { "epoch": 1700000060, "open": 101.75, "high": 103, "low": 101, "close": 102.5 }
            ],
            "subscription": { "id": "c9d7-sub" },
            "msg_type": "candles"
        }"#;
        let events = decode(json).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            GatewayEvent::Candles(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].time, 1_700_000_000_000);
                assert_eq!(list[0].open, 101.5);
                assert_eq!(list[0].low, 100.25);
                assert_eq!(list[1].close, 102.5);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            events[1],
            GatewayEvent::Subscription {
                id: "c9d7-sub".into()
            }
        );
    }

    #[test]
    fn ohlc_prefers_open_time() {
        let json = r#"{ "ohlc": {
            "epoch": 1700000042, "open_time": 1700000040,
            "open": "1.1", "high": "1.3", "low": "1.0", "close": "1.2"
        } }"#;
        let events = decode(json).unwrap();
        match &events[..] {
            [GatewayEvent::Ohlc(c)] => {
                assert_eq!(c.time, 1_700_000_040_000);
                assert_eq!(c.close, 1.2);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn ohlc_falls_back_to_epoch() {
        let json = r#"{ "ohlc": { "epoch": 60, "open": 1, "high": 1, "low": 1, "close": 1 } }"#;
        match &decode(json).unwrap()[..] {
            [GatewayEvent::Ohlc(c)] => assert_eq!(c.time, 60_000),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn decodes_tick() {
        let json = r#"{ "tick": { "quote": 1234.56, "epoch": 1700000001, "symbol": "R_25" } }"#;
        match &decode(json).unwrap()[..] {
            [GatewayEvent::Tick { quote, time }] => {
                assert_eq!(*quote, 1234.56);
                assert_eq!(time.timestamp_millis(), 1_700_000_001_000);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn decodes_balances() {
        let events = decode(r#"{ "authorize": { "balance": 10000, "loginid": "VRTC1" } }"#).unwrap();
        assert_eq!(events, vec![GatewayEvent::Authorize { balance: Some(10000.0) }]);

        let events = decode(r#"{ "balance": { "balance": "42.5", "currency": "USD" } }"#).unwrap();
        assert_eq!(events, vec![GatewayEvent::Balance { balance: Some(42.5) }]);
    }

    #[test]
    fn decodes_error_with_default_message() {
        let events = decode(r#"{ "error": { "code": "InvalidSymbol", "message": "x" } }"#).unwrap();
        assert_eq!(
            events,
            vec![GatewayEvent::Error {
                code: Some("InvalidSymbol".into()),
                message: "x".into()
            }]
        );

        let events = decode(r#"{ "error": {} }"#).unwrap();
        assert_eq!(
            events,
            vec![GatewayEvent::Error {
                code: None,
                message: "Unknown error".into()
            }]
        );
    }

    #[test]
    fn unrecognised_frame_is_empty() {
        assert!(decode(r#"{ "ping": "pong", "msg_type": "ping" }"#).unwrap().is_empty());
        assert!(decode(r#"{ "tick": null }"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_frames_fail() {
        assert!(decode("not json").is_err());
        assert!(decode("[1, 2, 3]").is_err());
        assert!(decode(r#"{ "candles": "nope" }"#).is_err());
        assert!(decode(r#"{ "tick": { "quote": "abc", "epoch": 1 } }"#).is_err());
        assert!(decode(r#"{ "ohlc": { "open_time": 1, "open": 1, "high": 1, "low": 1 } }"#).is_err());
        assert!(decode(r#"{ "subscription": {} }"#).is_err());
    }
}
