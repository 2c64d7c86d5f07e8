//! FieldCodec - translation between the domain model and ATP wire records
//!
//! Every enum table is declared once and expands into both directions, so an
//! entry can never exist in one direction only: a duplicated wire code or domain
//! value is an unreachable pattern, which is denied.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::atp_api::model::*;
use crate::core::error::TranslationError;
use crate::core::types::*;

/// Wire price (and cash) units per 1.0
pub const PRICE_SCALE: i64 = 10_000;
/// Wire quantity units per 1.0
pub const VOLUME_SCALE: i64 = 100;

const PRICE_DP: u32 = 4;
const VOLUME_DP: u32 = 2;

/// UTC offset of wire timestamps (China Standard Time)
const WIRE_UTC_OFFSET_HOURS: i64 = 8;

macro_rules! wire_table {
    (
        $(#[$meta:meta])*
        $table:ident : $domain:ty => $wire:ty, $field:literal {
            $($variant:path => $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub struct $table;

        impl $table {
            pub const FIELD: &'static str = $field;

            pub const ENTRIES: &'static [($domain, $wire)] = &[$(($variant, $code)),+];

            #[deny(unreachable_patterns)]
            pub fn encode(value: $domain) -> $wire {
                match value {
                    $($variant => $code,)+
                }
            }

            #[deny(unreachable_patterns)]
            pub fn decode(raw: $wire) -> Result<$domain, TranslationError> {
                match raw {
                    $($code => Ok($variant),)+
                    other => Err(TranslationError::new($field, other)),
                }
            }
        }
    };
}

wire_table! {
    /// Exchange <-> market id
    ExchangeCodec: Exchange => u16, "market_id" {
        Exchange::Sse => 101,
        Exchange::Szse => 102,
    }
}

wire_table! {
    DirectionCodec: Direction => char, "side" {
        Direction::Long => '1',
        Direction::Short => '2',
    }
}

wire_table! {
    OffsetCodec: Offset => char, "position_effect" {
        Offset::None => 'N',
        Offset::Open => 'O',
        Offset::Close => 'C',
    }
}

wire_table! {
    OrderTypeCodec: OrderType => char, "ord_type" {
        OrderType::Market => '1',
        OrderType::Limit => '2',
    }
}

wire_table! {
    OptionTypeCodec: OptionType => char, "call_or_put" {
        OptionType::Call => 'C',
        OptionType::Put => 'P',
    }
}

wire_table! {
    ProductCodec: Product => char, "security_type" {
        Product::Equity => '1',
        Product::Fund => '2',
        Product::Bond => '3',
        Product::Option => '4',
    }
}

/// Wire order status -> domain status. Not injective, so decode-only.
pub const STATUS_TABLE: [(char, Status); 10] = [
    ('0', Status::Submitting), // new, accepted by the exchange
    ('A', Status::Submitting), // pending new
    ('P', Status::Submitting), // internal ack from the gateway
    ('6', Status::Submitting), // pending cancel
    ('1', Status::PartTraded),
    ('2', Status::AllTraded),
    ('4', Status::Cancelled),
    ('5', Status::Cancelled), // cancelled after partial fill
    ('C', Status::Cancelled), // expired
    ('8', Status::Rejected),
];

const fn codes_distinct(table: &[(char, Status)]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let mut j = i + 1;
        while j < table.len() {
            if table[i].0 == table[j].0 {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(codes_distinct(&STATUS_TABLE));

pub fn decode_status(raw: char) -> Result<Status, TranslationError> {
    STATUS_TABLE
        .iter()
        .find(|(code, _)| *code == raw)
        .map(|(_, status)| *status)
        .ok_or_else(|| TranslationError::new("ord_status", raw))
}

fn scale_to_wire(value: Decimal, scale: i64, field: &'static str) -> Result<i64, TranslationError> {
    let scaled = value
        .checked_mul(Decimal::from(scale))
        .ok_or_else(|| TranslationError::new(field, value))?;
    if !scaled.fract().is_zero() {
        // finer than one wire unit; rounding would change the order
        return Err(TranslationError::new(field, value));
    }
    scaled.to_i64().ok_or_else(|| TranslationError::new(field, value))
}

pub fn encode_price(price: Decimal) -> Result<i64, TranslationError> {
    scale_to_wire(price, PRICE_SCALE, "price")
}

pub fn decode_price(raw: i64) -> Decimal {
    Decimal::new(raw, PRICE_DP).normalize()
}

pub fn encode_volume(volume: Decimal) -> Result<i64, TranslationError> {
    scale_to_wire(volume, VOLUME_SCALE, "qty")
}

pub fn decode_volume(raw: i64) -> Decimal {
    Decimal::new(raw, VOLUME_DP).normalize()
}

/// `yyyymmddHHMMSSsss` (UTC+8) -> UTC
pub fn decode_time(raw: i64) -> Result<DateTime<Utc>, TranslationError> {
    let err = || TranslationError::new("transact_time", raw);
    if raw <= 0 {
        return Err(err());
    }
    let millis = raw % 1000;
    let mut rest = raw / 1000;
    let second = rest % 100;
    rest /= 100;
    let minute = rest % 100;
    rest /= 100;
    let hour = rest % 100;
    rest /= 100;
    let day = rest % 100;
    rest /= 100;
    let month = rest % 100;
    let year = rest / 100;

    let local = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|d| d.and_hms_milli_opt(hour as u32, minute as u32, second as u32, millis as u32))
        .ok_or_else(err)?;
    Ok((local - Duration::hours(WIRE_UTC_OFFSET_HOURS)).and_utc())
}

pub fn encode_time(time: DateTime<Utc>) -> i64 {
    let t = time.naive_utc() + Duration::hours(WIRE_UTC_OFFSET_HOURS);
    let date = i64::from(t.year()) * 10_000 + i64::from(t.month()) * 100 + i64::from(t.day());
    let clock = i64::from(t.hour()) * 10_000 + i64::from(t.minute()) * 100 + i64::from(t.second());
    (date * 1_000_000 + clock) * 1000 + i64::from(t.nanosecond() / 1_000_000 % 1000)
}

fn decode_security(raw: &str) -> Result<Symbol, TranslationError> {
    let symbol = Symbol::new(raw);
    if symbol.as_str().is_empty() {
        return Err(TranslationError::new("security_id", raw));
    }
    Ok(symbol)
}

/// Accounts an order is booked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingAccount {
    pub cust_id: String,
    pub fund_account_id: String,
    pub account_id: String,
}

pub fn encode_order(
    local_id: LocalId,
    req: &OrderRequest,
    account: &TradingAccount,
) -> Result<NewOrder, TranslationError> {
    Ok(NewOrder {
        cl_ord_no: local_id.value(),
        cust_id: account.cust_id.clone(),
        fund_account_id: account.fund_account_id.clone(),
        account_id: account.account_id.clone(),
        market_id: ExchangeCodec::encode(req.exchange),
        security_id: req.symbol.to_string(),
        side: DirectionCodec::encode(req.direction),
        position_effect: OffsetCodec::encode(req.offset),
        ord_type: OrderTypeCodec::encode(req.order_type),
        price: encode_price(req.price)?,
        order_qty: encode_volume(req.volume)?,
    })
}

pub fn encode_cancel(order: &OrderRecord, system_id: &SystemId, account: &TradingAccount) -> CancelOrder {
    CancelOrder {
        orig_cl_ord_no: order.local_id.value(),
        orig_order_id: system_id.to_string(),
        cust_id: account.cust_id.clone(),
        fund_account_id: account.fund_account_id.clone(),
        account_id: account.account_id.clone(),
        market_id: ExchangeCodec::encode(order.exchange),
        security_id: order.symbol.to_string(),
    }
}

/// Full order view carried by an acknowledgment.
pub fn decode_ack(ack: &OrderStatusAck) -> Result<OrderRecord, TranslationError> {
    Ok(OrderRecord {
        local_id: LocalId::new(ack.cl_ord_no),
        system_id: SystemId::parse(&ack.order_id),
        symbol: decode_security(&ack.security_id)?,
        exchange: ExchangeCodec::decode(ack.market_id)?,
        direction: DirectionCodec::decode(ack.side)?,
        offset: OffsetCodec::decode(ack.position_effect)?,
        order_type: OrderTypeCodec::decode(ack.ord_type)?,
        price: decode_price(ack.price),
        volume: decode_volume(ack.order_qty),
        traded: decode_volume(ack.cum_qty),
        status: decode_status(ack.ord_status)?,
        updated_at: decode_time(ack.transact_time)?,
    })
}

/// `local_id` is resolved by the caller from the registry.
pub fn decode_trade(report: &TradeReport, local_id: LocalId) -> Result<TradeRecord, TranslationError> {
    if report.exec_id.trim().is_empty() {
        return Err(TranslationError::new("exec_id", &report.exec_id));
    }
    let system_id =
        SystemId::parse(&report.order_id).ok_or_else(|| TranslationError::new("order_id", &report.order_id))?;
    Ok(TradeRecord {
        trade_id: report.exec_id.trim().to_string(),
        local_id,
        system_id,
        symbol: decode_security(&report.security_id)?,
        exchange: ExchangeCodec::decode(report.market_id)?,
        direction: DirectionCodec::decode(report.side)?,
        offset: OffsetCodec::decode(report.position_effect)?,
        price: decode_price(report.last_px),
        volume: decode_volume(report.last_qty),
        traded_at: decode_time(report.transact_time)?,
    })
}

pub fn decode_account(result: &FundQueryResult) -> AccountRecord {
    AccountRecord {
        account_id: result.fund_account_id.clone(),
        balance: decode_price(result.balance),
        frozen: decode_price(result.frozen),
    }
}

/// Cash equities only hold long positions.
pub fn decode_position(result: &ShareQueryResult) -> Result<PositionRecord, TranslationError> {
    Ok(PositionRecord {
        symbol: decode_security(&result.security_id)?,
        exchange: ExchangeCodec::decode(result.market_id)?,
        direction: Direction::Long,
        volume: decode_volume(result.total_qty),
        frozen: decode_volume(result.frozen_qty),
        yd_volume: decode_volume(result.init_qty),
        price: decode_price(result.cost_price),
    })
}

pub fn decode_contract(result: &ContractQueryResult) -> Result<ContractRecord, TranslationError> {
    let product = ProductCodec::decode(result.security_type)?;
    let option_type = match (product, result.call_or_put) {
        (Product::Option, Some(raw)) => Some(OptionTypeCodec::decode(raw)?),
        (Product::Option, None) => return Err(TranslationError::new(OptionTypeCodec::FIELD, "")),
        _ => None,
    };
    Ok(ContractRecord {
        symbol: decode_security(&result.security_id)?,
        exchange: ExchangeCodec::decode(result.market_id)?,
        name: result.security_name.trim().to_string(),
        product,
        size: decode_volume(result.contract_unit),
        price_tick: decode_price(result.price_tick),
        min_volume: decode_volume(result.buy_qty_unit),
        option_type,
        option_strike: option_type.and(result.exercise_price).map(decode_price),
        option_underlying: option_type.and(result.underlying_security_id.clone()),
    })
}

fn decode_levels(
    prices: &[i64],
    volumes: &[i64],
    side: &'static str,
) -> Result<Vec<BookLevel>, TranslationError> {
    if prices.len() != volumes.len() {
        return Err(TranslationError::new(
            side,
            format!("{} prices vs {} quantities", prices.len(), volumes.len()),
        ));
    }
    Ok(prices
        .iter()
        .zip(volumes)
        .take(5)
        .map(|(&px, &qty)| BookLevel {
            price: decode_price(px),
            volume: decode_volume(qty),
        })
        .collect())
}

pub fn decode_snapshot(snap: &MarketDataSnapshot) -> Result<TickRecord, TranslationError> {
    Ok(TickRecord {
        symbol: decode_security(&snap.security_id)?,
        exchange: ExchangeCodec::decode(snap.market_id)?,
        datetime: decode_time(snap.orig_time)?,
        last_price: decode_price(snap.last_px),
        open_price: decode_price(snap.open_px),
        high_price: decode_price(snap.high_px),
        low_price: decode_price(snap.low_px),
        pre_close: decode_price(snap.pre_close_px),
        volume: decode_volume(snap.total_volume_trade),
        turnover: decode_price(snap.total_value_trade),
        bids: decode_levels(&snap.bid_px, &snap.bid_qty, "bid")?,
        asks: decode_levels(&snap.offer_px, &snap.offer_qty, "offer")?,
    })
}

pub fn encode_subscription(req: &SubscribeRequest) -> Subscription {
    Subscription {
        market_id: ExchangeCodec::encode(req.exchange),
        security_ids: vec![req.symbol.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> TradingAccount {
        TradingAccount {
            cust_id: "C1".into(),
            fund_account_id: "F1".into(),
            account_id: "A0001".into(),
        }
    }

    #[test]
    fn test_enum_tables_round_trip() {
        fn check<D: Copy + PartialEq + std::fmt::Debug, W: Copy + PartialEq + std::fmt::Debug>(
            entries: &[(D, W)],
            encode: fn(D) -> W,
            decode: fn(W) -> Result<D, TranslationError>,
        ) {
            for &(domain, wire) in entries {
                assert_eq!(encode(domain), wire);
                assert_eq!(decode(wire), Ok(domain));
            }
        }
        check(ExchangeCodec::ENTRIES, ExchangeCodec::encode, ExchangeCodec::decode);
        check(DirectionCodec::ENTRIES, DirectionCodec::encode, DirectionCodec::decode);
        check(OffsetCodec::ENTRIES, OffsetCodec::encode, OffsetCodec::decode);
        check(OrderTypeCodec::ENTRIES, OrderTypeCodec::encode, OrderTypeCodec::decode);
        check(OptionTypeCodec::ENTRIES, OptionTypeCodec::encode, OptionTypeCodec::decode);
        check(ProductCodec::ENTRIES, ProductCodec::encode, ProductCodec::decode);
    }

    #[test]
    fn test_unknown_wire_value_is_an_error() {
        assert_eq!(
            ExchangeCodec::decode(999),
            Err(TranslationError::new("market_id", 999))
        );
        let err = DirectionCodec::decode('9').unwrap_err();
        assert_eq!(err.field, "side");
        assert_eq!(err.raw, "9");
        assert!(decode_status('Z').is_err());
    }

    #[test]
    fn test_status_table_shape() {
        let count = |s: Status| STATUS_TABLE.iter().filter(|(_, st)| *st == s).count();
        assert_eq!(STATUS_TABLE.len(), 10);
        assert_eq!(count(Status::Submitting), 4);
        assert_eq!(count(Status::Cancelled), 3);
        assert_eq!(count(Status::PartTraded), 1);
        assert_eq!(count(Status::AllTraded), 1);
        assert_eq!(count(Status::Rejected), 1);
        assert_eq!(decode_status('1'), Ok(Status::PartTraded));
        assert_eq!(decode_status('5'), Ok(Status::Cancelled));
    }

    #[test]
    fn test_price_and_volume_scaling() {
        assert_eq!(encode_price(dec!(12.34)), Ok(123_400));
        assert_eq!(encode_volume(dec!(3.0)), Ok(300));
        assert_eq!(decode_price(123_400), dec!(12.34));
        assert_eq!(decode_volume(100), dec!(1));

        for x in [dec!(0), dec!(0.0001), dec!(9.9999), dec!(12.34), dec!(123456.7891), dec!(-3.5)] {
            assert_eq!(decode_price(encode_price(x).unwrap()), x);
        }
        for raw in [0_i64, 1, 99, 300, 123_456_789] {
            assert_eq!(encode_volume(decode_volume(raw)), Ok(raw));
        }
    }

    #[test]
    fn test_sub_unit_values_are_rejected() {
        assert_eq!(
            encode_price(dec!(1.00001)),
            Err(TranslationError::new("price", "1.00001"))
        );
        assert!(encode_volume(dec!(0.001)).is_err());
        assert!(encode_price(Decimal::MAX).is_err());
    }

    #[test]
    fn test_time_round_trip() {
        let t = decode_time(20240115093000123).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-15T01:30:00.123+00:00");
        assert_eq!(encode_time(t), 20240115093000123);
        assert!(decode_time(20241315093000123).is_err());
        assert!(decode_time(0).is_err());
    }

    #[test]
    fn test_encode_order_and_decode_ack() {
        let req = OrderRequest {
            symbol: Symbol::new("600000"),
            exchange: Exchange::Sse,
            direction: Direction::Long,
            offset: Offset::None,
            order_type: OrderType::Limit,
            price: dec!(12.34),
            volume: dec!(3.0),
        };
        let wire = encode_order(LocalId::new(7), &req, &account()).unwrap();
        assert_eq!(wire.cl_ord_no, 7);
        assert_eq!(wire.market_id, 101);
        assert_eq!(wire.side, '1');
        assert_eq!(wire.ord_type, '2');
        assert_eq!(wire.price, 123_400);
        assert_eq!(wire.order_qty, 300);

        let ack = OrderStatusAck {
            cl_ord_no: 7,
            order_id: "SYS-1".into(),
            market_id: 101,
            security_id: "600000".into(),
            side: '1',
            position_effect: 'N',
            ord_type: '2',
            price: 123_400,
            order_qty: 300,
            cum_qty: 100,
            ord_status: '1',
            transact_time: 20240115093000123,
            reject_reason: String::new(),
        };
        let record = decode_ack(&ack).unwrap();
        assert_eq!(record.local_id, LocalId::new(7));
        assert_eq!(record.system_id, SystemId::parse("SYS-1"));
        assert_eq!(record.traded, dec!(1.0));
        assert_eq!(record.volume, dec!(3));
        assert_eq!(record.price, dec!(12.34));
        assert_eq!(record.status, Status::PartTraded);
    }

    #[test]
    fn test_decode_contract_option_fields() {
        let mut result = ContractQueryResult {
            market_id: 101,
            security_id: "10004567".into(),
            security_name: "50ETF Call 3000".into(),
            security_type: '4',
            price_tick: 1,
            buy_qty_unit: 100,
            contract_unit: 1_000_000,
            call_or_put: Some('C'),
            exercise_price: Some(30_000),
            underlying_security_id: Some("510050".into()),
        };
        let contract = decode_contract(&result).unwrap();
        assert_eq!(contract.product, Product::Option);
        assert_eq!(contract.option_type, Some(OptionType::Call));
        assert_eq!(contract.option_strike, Some(dec!(3)));
        assert_eq!(contract.size, dec!(10000));
        assert_eq!(contract.price_tick, dec!(0.0001));

        result.call_or_put = None;
        assert!(decode_contract(&result).is_err());
    }

    #[test]
    fn test_snapshot_with_mismatched_depth_is_rejected() {
        let snap = MarketDataSnapshot {
            market_id: 102,
            security_id: "000001".into(),
            orig_time: 20240115093000000,
            bid_px: vec![100_000, 99_900],
            bid_qty: vec![1_000],
            ..Default::default()
        };
        let err = decode_snapshot(&snap).unwrap_err();
        assert_eq!(err.field, "bid");
    }
}
