//! Clickstream → `dim_user` and the append-only `fact_app_events`.

use super::{Job, JobKind, TransformContext};
use crate::coerce::{self, CoercionPlan};
use crate::dimension::{self, DedupOrder, DimensionSpec, SurrogateKey};
use crate::error::Result;
use crate::fact;
use crate::load::{LoadMode, TableLoad};
use crate::normalize;
use crate::types::{Frame, TableSchema};

pub const DIM_USER: &str = "dim_user";
pub const FACT_APP_EVENTS: &str = "fact_app_events";

const USER_COLUMN: &str = "UserID";

pub const EVENT_MAPPING: [(&str, &str); 6] = [
    ("SessionID", "sessionid"),
    ("Timestamp", "timestamp"),
    ("EventType", "event_name"),
    ("ProductID", "productid"),
    ("Amount", "amount"),
    ("Outcome", "outcome"),
];

const USER_PLAN: CoercionPlan<'static> = CoercionPlan {
    integer: &[USER_COLUMN],
    decimal: &[],
    text: &[],
    scale: &[],
    boolean: &[],
    required: &[],
};

const EVENT_PLAN: CoercionPlan<'static> = CoercionPlan {
    integer: &["sessionid"],
    decimal: &["amount"],
    text: &["event_name", "productid", "outcome"],
    scale: &[],
    boolean: &[],
    required: &[],
};

pub struct EventJob;

impl Job for EventJob {
    fn kind(&self) -> JobKind {
        JobKind::Event
    }

    fn default_input(&self) -> &'static str {
        "source_data/ecommerce_clickstream_transactions.csv"
    }

    fn tables(&self) -> Vec<TableSchema> {
        vec![
            TableSchema::new(DIM_USER)
                .key("user_sk", "VARCHAR(50)")
                .required("userid", "INTEGER"),
            TableSchema::new(FACT_APP_EVENTS)
                .column("user_sk", "VARCHAR(50)")
                .column("sessionid", "INTEGER")
                .column("timestamp", "VARCHAR(50)")
                .column("event_name", "VARCHAR(100)")
                .column("productid", "VARCHAR(100)")
                .column("amount", "DECIMAL(10,2)")
                .column("outcome", "VARCHAR(100)")
                .references("user_sk", DIM_USER, "user_sk"),
        ]
    }

    fn transform(&self, source: Frame, ctx: &TransformContext) -> Result<Vec<TableLoad>> {
        let events = coerce::apply(source, &USER_PLAN)?;
        let mut users = dimension::build_dimension(
            &events,
            &DimensionSpec {
                name: DIM_USER,
                natural_key: &[USER_COLUMN],
                attributes: &[],
                order: DedupOrder::sorted(),
                surrogate: SurrogateKey::prefixed("user_sk", "CLK_U"),
            },
        )?;
        users.rename_column(USER_COLUMN, "userid");

        let events = fact::attach_key(events, &users, &[(USER_COLUMN, "userid")], "user_sk")?;
        let events = normalize::normalize(
            events,
            &EVENT_MAPPING,
            ctx.schema(FACT_APP_EVENTS)?,
            ctx.mapping_policy,
        )?;
        let events = coerce::apply(events, &EVENT_PLAN)?;

        Ok(vec![
            TableLoad::new(
                DIM_USER,
                normalize::reconcile(&users, ctx.schema(DIM_USER)?),
                LoadMode::TruncateAppend,
            ),
            TableLoad::new(FACT_APP_EVENTS, events, LoadMode::Append),
        ])
    }
}
