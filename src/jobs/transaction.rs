//! Order history → restaurant, customer and time dimensions plus `fact_orders`.

use super::{Job, JobKind, TransformContext};
use crate::coerce::{self, CoercionPlan};
use crate::dimension::{self, DedupOrder, DimensionSpec, SurrogateKey};
use crate::error::Result;
use crate::fact;
use crate::load::{LoadMode, TableLoad};
use crate::normalize;
use crate::types::{Frame, TableSchema, Value};
use crate::util::{parse_timestamp_safe, TIMESTAMP_FORMAT};
use chrono::{Datelike, NaiveDateTime};

pub const DIM_RESTAURANT: &str = "dim_restaurant";
pub const DIM_CUSTOMER_ORDERS: &str = "dim_customer_orders";
pub const DIM_TIME: &str = "dim_time";
pub const FACT_ORDERS: &str = "fact_orders";

/// e.g. `11:38 PM, September 10 2024`
pub const ORDER_TIMESTAMP_FORMAT: &str = "%I:%M %p, %B %d %Y";

const CUSTOMER_PREFIX: &str = "ORD_";

const RESTAURANT_MAPPING: [(&str, &str); 3] = [
    ("Restaurant name", "restaurant_name"),
    ("Subzone", "subzone"),
    ("City", "city"),
];

pub const ORDER_MAPPING: [(&str, &str); 23] = [
    ("Order ID", "order_id"),
    ("Restaurant ID", "restaurant_id"),
    ("Customer ID", "customer_id"),
    ("Order Placed At", "order_placed_at"),
    ("Order Status", "order_status"),
    ("Delivery", "delivery_type"),
    ("Distance", "distance"),
    ("Items in order", "items_in_order"),
    ("Instructions", "instructions"),
    ("Discount construct", "discount_construct"),
    ("Bill subtotal", "bill_subtotal"),
    ("Packaging charges", "packaging_charges"),
    ("Restaurant discount (Promo)", "restaurant_discount_promo"),
    (
        "Restaurant discount (Flat offs, Freebies & others)",
        "restaurant_discount_flat",
    ),
    ("Gold discount", "gold_discount"),
    ("Brand pack discount", "brand_pack_discount"),
    ("Total", "total"),
    ("Cancellation / Rejection reason", "cancellation_reason"),
    ("Restaurant compensation (Cancellation)", "restaurant_compensation"),
    ("Restaurant penalty (Rejection)", "restaurant_penalty"),
    ("KPT duration (minutes)", "kpt_duration"),
    ("Rider wait time (minutes)", "rider_wait_time"),
    ("Order Ready Marked", "order_ready_marked"),
];

const MONEY_COLUMNS: [&str; 11] = [
    "bill_subtotal",
    "packaging_charges",
    "restaurant_discount_promo",
    "restaurant_discount_flat",
    "gold_discount",
    "brand_pack_discount",
    "total",
    "restaurant_compensation",
    "restaurant_penalty",
    "kpt_duration",
    "rider_wait_time",
];

const KEY_TEXT: CoercionPlan<'static> = CoercionPlan {
    integer: &[],
    decimal: &[],
    text: &[
        "order_id",
        "restaurant_id",
        "customer_id",
        "restaurant_name",
        "subzone",
        "city",
    ],
    scale: &[],
    boolean: &[],
    required: &[],
};

const FACT_PLAN: CoercionPlan<'static> = CoercionPlan {
    integer: &[],
    decimal: &MONEY_COLUMNS,
    text: &[],
    scale: &[],
    boolean: &[],
    required: &["order_id", "restaurant_id", "customer_id", "order_placed_at"],
};

pub struct TransactionJob;

impl Job for TransactionJob {
    fn kind(&self) -> JobKind {
        JobKind::Transaction
    }

    fn default_input(&self) -> &'static str {
        "source_data/order_history_kaggle_data.csv"
    }

    fn tables(&self) -> Vec<TableSchema> {
        let mut fact_orders = TableSchema::new(FACT_ORDERS)
            .key("order_id", "VARCHAR(50)")
            .column("restaurant_id", "VARCHAR(50)")
            .column("customer_id", "VARCHAR(50)")
            .column("time_key", "INTEGER")
            .column("order_placed_at", "TIMESTAMP")
            .column("order_status", "VARCHAR(50)")
            .column("delivery_type", "VARCHAR(50)")
            .column("distance", "TEXT")
            .column("items_in_order", "TEXT")
            .column("instructions", "TEXT")
            .column("discount_construct", "TEXT");
        for money in MONEY_COLUMNS.iter().take(7) {
            fact_orders = fact_orders.column(money, "DECIMAL(10,2)");
        }
        fact_orders = fact_orders.column("cancellation_reason", "TEXT");
        for money in MONEY_COLUMNS.iter().skip(7) {
            fact_orders = fact_orders.column(money, "DECIMAL(10,2)");
        }
        let fact_orders = fact_orders
            .column("order_ready_marked", "VARCHAR(50)")
            .references("restaurant_id", DIM_RESTAURANT, "restaurant_id")
            .references("customer_id", DIM_CUSTOMER_ORDERS, "customer_id")
            .references("time_key", DIM_TIME, "time_key");

        vec![
            TableSchema::new(DIM_RESTAURANT)
                .key("restaurant_id", "VARCHAR(50)")
                .column("restaurant_name", "VARCHAR(200)")
                .column("subzone", "VARCHAR(100)")
                .column("city", "VARCHAR(100)"),
            TableSchema::new(DIM_CUSTOMER_ORDERS).key("customer_id", "VARCHAR(50)"),
            TableSchema::new(DIM_TIME)
                .key("time_key", "INTEGER")
                .column("order_placed_at", "TIMESTAMP")
                .column("date", "DATE")
                .column("time", "TIME")
                .column("day", "INTEGER")
                .column("month", "INTEGER")
                .column("year", "INTEGER")
                .column("weekday", "VARCHAR(20)"),
            fact_orders,
        ]
    }

    fn transform(&self, source: Frame, ctx: &TransformContext) -> Result<Vec<TableLoad>> {
        let orders = normalize::rename_columns(source, &RESTAURANT_MAPPING, ctx.mapping_policy)?;
        let orders = normalize::rename_columns(orders, &ORDER_MAPPING, ctx.mapping_policy)?;
        let orders = coerce::apply(orders, &KEY_TEXT)?;
        let mut orders = fact::prefix_values(orders, "customer_id", CUSTOMER_PREFIX)?;
        orders.map_column("order_placed_at", |v| {
            parse_timestamp_safe(v.as_str(), ORDER_TIMESTAMP_FORMAT)
                .map(|ts| Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
                .unwrap_or(Value::Null)
        })?;

        let restaurants = dimension::build_dimension(
            &orders,
            &DimensionSpec {
                name: DIM_RESTAURANT,
                natural_key: &["restaurant_id"],
                attributes: &["restaurant_name", "subzone", "city"],
                order: DedupOrder::sorted_by(&["restaurant_name"]),
                surrogate: SurrogateKey::Natural,
            },
        )?;
        let customers = dimension::build_dimension(
            &orders,
            &DimensionSpec {
                name: DIM_CUSTOMER_ORDERS,
                natural_key: &["customer_id"],
                attributes: &[],
                order: DedupOrder::sorted(),
                surrogate: SurrogateKey::Natural,
            },
        )?;
        let mut times = dimension::build_dimension(
            &orders,
            &DimensionSpec {
                name: DIM_TIME,
                natural_key: &["order_placed_at"],
                attributes: &[],
                order: DedupOrder::sorted(),
                surrogate: SurrogateKey::sequence("time_key"),
            },
        )?;
        add_time_attributes(&mut times)?;

        let orders = fact::attach_key(
            orders,
            &times,
            &[("order_placed_at", "order_placed_at")],
            "time_key",
        )?;
        let orders = normalize::reconcile(&orders, ctx.schema(FACT_ORDERS)?);
        let orders = coerce::apply(orders, &FACT_PLAN)?;

        Ok(vec![
            TableLoad::new(
                DIM_RESTAURANT,
                normalize::reconcile(&restaurants, ctx.schema(DIM_RESTAURANT)?),
                LoadMode::TruncateAppend,
            ),
            TableLoad::new(
                DIM_CUSTOMER_ORDERS,
                normalize::reconcile(&customers, ctx.schema(DIM_CUSTOMER_ORDERS)?),
                LoadMode::TruncateAppend,
            ),
            TableLoad::new(
                DIM_TIME,
                normalize::reconcile(&times, ctx.schema(DIM_TIME)?),
                LoadMode::TruncateAppend,
            ),
            TableLoad::new(FACT_ORDERS, orders, LoadMode::TruncateAppend),
        ])
    }
}

/// Derive calendar columns from the `order_placed_at` timestamp text.
fn add_time_attributes(times: &mut Frame) -> Result<()> {
    let parsed: Vec<Option<NaiveDateTime>> = times
        .column_values("order_placed_at")?
        .into_iter()
        .map(|v| parse_timestamp_safe(v.as_str(), TIMESTAMP_FORMAT))
        .collect();

    let date = derive(&parsed, |ts| Value::Text(ts.format("%Y-%m-%d").to_string()));
    let time = derive(&parsed, |ts| Value::Text(ts.format("%H:%M:%S").to_string()));
    let day = derive(&parsed, |ts| Value::Int(ts.day() as i64));
    let month = derive(&parsed, |ts| Value::Int(ts.month() as i64));
    let year = derive(&parsed, |ts| Value::Int(ts.year() as i64));
    let weekday = derive(&parsed, |ts| Value::Text(ts.format("%A").to_string()));

    times.push_column("date", date)?;
    times.push_column("time", time)?;
    times.push_column("day", day)?;
    times.push_column("month", month)?;
    times.push_column("year", year)?;
    times.push_column("weekday", weekday)?;
    Ok(())
}

fn derive<F>(parsed: &[Option<NaiveDateTime>], f: F) -> Vec<Value>
where
    F: Fn(&NaiveDateTime) -> Value,
{
    parsed
        .iter()
        .map(|ts| ts.as_ref().map(&f).unwrap_or(Value::Null))
        .collect()
}
