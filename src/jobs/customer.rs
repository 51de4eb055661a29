//! Customer survey → `dim_customer`.

use super::{Job, JobKind, TransformContext};
use crate::coerce::{self, CoercionPlan};
use crate::dimension::{self, SurrogateKey};
use crate::error::Result;
use crate::load::{LoadMode, TableLoad};
use crate::normalize;
use crate::types::{Frame, TableSchema};

pub const DIM_CUSTOMER: &str = "dim_customer";

/// Survey header → warehouse column. Some headers carry the survey's own typos
/// and a trailing space; they must match byte for byte.
pub const COLUMN_MAPPING: [(&str, &str); 23] = [
    ("Age", "age"),
    ("Gender", "gender"),
    ("Marital Status", "marital_status"),
    ("Occupation", "occupation"),
    ("Educational Qualifications", "education"),
    ("Family size", "family_size"),
    ("Frequently used Medium", "medium_used"),
    ("Frequently ordered Meal category ", "meal_category"),
    ("Perference", "preference"),
    ("Restaurnat Rating", "restaurant_rating"),
    ("Delivery Rating", "delivery_rating"),
    ("No. of orders placed", "orders_placed"),
    ("Delivery Time", "delivery_time"),
    ("Order Value", "order_value"),
    ("Ease and convenient", "ease_convenience"),
    ("Self Cooking", "self_cooking"),
    ("Health Concern", "health_concern"),
    ("Late Delivery", "late_delivery"),
    ("Poor Hygiene", "poor_hygiene"),
    ("Bad past experience", "bad_experience"),
    ("More Offers and Discount", "more_offers_discount"),
    ("Maximum wait time", "max_wait_time"),
    ("Influence of rating", "influence_of_rating"),
];

const INTEGER_COLUMNS: [&str; 6] = [
    "age",
    "family_size",
    "restaurant_rating",
    "delivery_rating",
    "orders_placed",
    "order_value",
];

const PLAN: CoercionPlan<'static> = CoercionPlan {
    integer: &INTEGER_COLUMNS,
    decimal: &["delivery_time"],
    text: &[],
    scale: &[
        "ease_convenience",
        "health_concern",
        "bad_experience",
        "more_offers_discount",
    ],
    boolean: &["self_cooking", "late_delivery", "poor_hygiene"],
    required: &INTEGER_COLUMNS,
};

pub struct CustomerJob;

impl Job for CustomerJob {
    fn kind(&self) -> JobKind {
        JobKind::Customer
    }

    fn default_input(&self) -> &'static str {
        "source_data/customers.csv"
    }

    fn tables(&self) -> Vec<TableSchema> {
        vec![TableSchema::new(DIM_CUSTOMER)
            .key("customer_id", "VARCHAR(20)")
            .column("age", "INTEGER")
            .column("gender", "VARCHAR(20)")
            .column("marital_status", "VARCHAR(50)")
            .column("occupation", "VARCHAR(100)")
            .column("education", "VARCHAR(100)")
            .column("family_size", "INTEGER")
            .column("medium_used", "VARCHAR(100)")
            .column("meal_category", "VARCHAR(100)")
            .column("preference", "VARCHAR(100)")
            .column("restaurant_rating", "INTEGER")
            .column("delivery_rating", "INTEGER")
            .column("orders_placed", "INTEGER")
            .column("delivery_time", "DECIMAL(10,2)")
            .column("order_value", "INTEGER")
            .column("ease_convenience", "INTEGER")
            .column("self_cooking", "BOOLEAN")
            .column("health_concern", "INTEGER")
            .column("late_delivery", "BOOLEAN")
            .column("poor_hygiene", "BOOLEAN")
            .column("bad_experience", "INTEGER")
            .column("more_offers_discount", "INTEGER")
            .column("max_wait_time", "VARCHAR(50)")
            .column("influence_of_rating", "VARCHAR(50)")]
    }

    fn transform(&self, source: Frame, ctx: &TransformContext) -> Result<Vec<TableLoad>> {
        // keys follow source row order, so rows dropped later leave gaps
        let keyed = dimension::assign_row_keys(source, &SurrogateKey::prefixed("customer_id", "CUS_"))?;
        let renamed = normalize::rename_columns(keyed, &COLUMN_MAPPING, ctx.mapping_policy)?;
        // only columns the survey supplied can disqualify a row
        let required: Vec<&str> = INTEGER_COLUMNS
            .iter()
            .copied()
            .filter(|c| renamed.column_index(c).is_some())
            .collect();
        let customers = normalize::reconcile(&renamed, ctx.schema(DIM_CUSTOMER)?);
        let plan = CoercionPlan {
            required: &required,
            ..PLAN
        };
        let customers = coerce::apply(customers, &plan)?;
        Ok(vec![TableLoad::new(
            DIM_CUSTOMER,
            customers,
            LoadMode::TruncateAppend,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{declared_schemas, load};
    use crate::normalize::MappingPolicy;
    use crate::types::Value;

    const HEADER: [&str; 10] = [
        "Age",
        "Gender",
        "Family size",
        "Restaurnat Rating",
        "Delivery Rating",
        "No. of orders placed",
        "Order Value",
        "Self Cooking",
        "Ease and convenient",
        "Favourite colour",
    ];

    fn transform(rows: &[&[&str]], policy: MappingPolicy) -> Result<Frame> {
        let schemas = declared_schemas(&CustomerJob);
        let ctx = TransformContext::new(&schemas, policy);
        let plans = CustomerJob.transform(Frame::from_text(&HEADER, rows), &ctx)?;
        Ok(load(&plans, DIM_CUSTOMER).clone())
    }

    #[test]
    fn test_survey_row_is_coerced() {
        let dim = transform(
            &[&["25", " Female ", "3", "4", "5", "2", "3", "Yes", "Agree", "blue"]],
            MappingPolicy::Warn,
        )
        .unwrap();
        assert_eq!(dim.len(), 1);
        assert_eq!(dim.value(0, "customer_id"), Some(&Value::text("CUS_1")));
        assert_eq!(dim.value(0, "age"), Some(&Value::Int(25)));
        assert_eq!(dim.value(0, "self_cooking"), Some(&Value::Bool(true)));
        assert_eq!(dim.value(0, "ease_convenience"), Some(&Value::Int(4)));
        // unmapped scale and boolean columns get their defaults
        assert_eq!(dim.value(0, "health_concern"), Some(&Value::Int(3)));
        assert_eq!(dim.value(0, "poor_hygiene"), Some(&Value::Bool(false)));
        assert_eq!(dim.value(0, "delivery_time"), Some(&Value::Null));
        assert!(dim.column_index("Favourite colour").is_none());
        assert_eq!(dim.columns()[0], "customer_id");
    }

    #[test]
    fn test_partial_survey_row_is_kept() {
        let schemas = declared_schemas(&CustomerJob);
        let ctx = TransformContext::new(&schemas, MappingPolicy::Warn);
        let source = Frame::from_text(
            &["Age", "Self Cooking", "Ease and convenient"],
            &[&["25", "Yes", "Agree"], &["abc", "No", "Neutral"]],
        );
        let plans = CustomerJob.transform(source, &ctx).unwrap();
        let dim = load(&plans, DIM_CUSTOMER);
        assert_eq!(dim.len(), 1);
        assert_eq!(dim.value(0, "age"), Some(&Value::Int(25)));
        assert_eq!(dim.value(0, "self_cooking"), Some(&Value::Bool(true)));
        assert_eq!(dim.value(0, "ease_convenience"), Some(&Value::Int(4)));
        assert_eq!(dim.value(0, "family_size"), Some(&Value::Null));
    }

    #[test]
    fn test_unparseable_required_value_drops_row() {
        let dim = transform(
            &[
                &["abc", "Male", "3", "4", "5", "2", "3", "No", "Neutral", ""],
                &["31", "Male", "2", "4", "4", "1", "2", "No", "Strongly agree", ""],
            ],
            MappingPolicy::Warn,
        )
        .unwrap();
        assert_eq!(dim.len(), 1);
        assert_eq!(dim.value(0, "customer_id"), Some(&Value::text("CUS_2")));
        assert_eq!(dim.value(0, "ease_convenience"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_strict_mapping_rejects_partial_survey() {
        let err = transform(
            &[&["25", "Female", "3", "4", "5", "2", "3", "Yes", "Agree", ""]],
            MappingPolicy::Strict,
        )
        .unwrap_err();
        assert_eq!(err.stage(), "transform");
    }
}
