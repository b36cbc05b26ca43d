//! Aggregate statistics over a set of structures.
//!
//! The same record backs the stats endpoint and the precomputed hexbin
//! tables. Aggregates are cast in SQL so column types are stable regardless of
//! the input column types (`avg` over integers yields `numeric` otherwise).

use crate::record::{FieldSpec, FieldValue};
use serde::Serialize;

/// Summary statistics. Every value is `None` over an empty selection except
/// `num_structures`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct StructureSummary {
    pub num_structures: Option<i64>,
    pub yrbuilt_min: Option<i32>,
    pub yrbuilt_max: Option<i32>,
    pub num_story_mean: Option<f64>,
    pub resunits_sum: Option<i64>,
    pub empnum_sum: Option<i64>,
    pub teachers_sum: Option<i64>,
    pub students_sum: Option<i64>,
    pub sqft_mean: Option<f64>,
    pub sqft_sum: Option<f64>,
    pub pop2amu65_sum: Option<i64>,
    pub pop2amo65_sum: Option<i64>,
    pub pop2pmu65_sum: Option<i64>,
    pub pop2pmo65_sum: Option<i64>,
    pub val_struct_sum: Option<f64>,
    pub val_cont_sum: Option<f64>,
    pub val_vehic_sum: Option<f64>,
    pub med_yr_blt_min: Option<i32>,
    pub med_yr_blt_max: Option<i32>,
    pub ground_elv_max: Option<f64>,
    pub ground_elv_min: Option<f64>,
}

/// Aggregating select over the structure table.
pub const SUMMARY_SELECT: &str = "SELECT \
     count(fd_id)::int8 AS num_structures,\
     min(yrbuilt)::int4 AS yrbuilt_min,\
     max(yrbuilt)::int4 AS yrbuilt_max,\
     avg(num_story)::float8 AS num_story_mean,\
     sum(resunits)::int8 AS resunits_sum,\
     sum(empnum)::int8 AS empnum_sum,\
     sum(teachers)::int8 AS teachers_sum,\
     sum(students)::int8 AS students_sum,\
     avg(sqft)::float8 AS sqft_mean,\
     sum(sqft)::float8 AS sqft_sum,\
     sum(pop2amu65)::int8 AS pop2amu65_sum,\
     sum(pop2amo65)::int8 AS pop2amo65_sum,\
     sum(pop2pmu65)::int8 AS pop2pmu65_sum,\
     sum(pop2pmo65)::int8 AS pop2pmo65_sum,\
     sum(val_struct)::float8 AS val_struct_sum,\
     sum(val_cont)::float8 AS val_cont_sum,\
     sum(val_vehic)::float8 AS val_vehic_sum,\
     min(med_yr_blt)::int4 AS med_yr_blt_min,\
     max(med_yr_blt)::int4 AS med_yr_blt_max,\
     max(ground_elv)::float8 AS ground_elv_max,\
     min(ground_elv)::float8 AS ground_elv_min \
     FROM nsi";

/// Stored summary columns of a hexbin table, cast to the record's types.
pub const SUMMARY_COLUMNS: &str = "num_structures::int8 AS num_structures,\
     yrbuilt_min::int4 AS yrbuilt_min,\
     yrbuilt_max::int4 AS yrbuilt_max,\
     num_story_mean::float8 AS num_story_mean,\
     resunits_sum::int8 AS resunits_sum,\
     empnum_sum::int8 AS empnum_sum,\
     teachers_sum::int8 AS teachers_sum,\
     students_sum::int8 AS students_sum,\
     sqft_mean::float8 AS sqft_mean,\
     sqft_sum::float8 AS sqft_sum,\
     pop2amu65_sum::int8 AS pop2amu65_sum,\
     pop2amo65_sum::int8 AS pop2amo65_sum,\
     pop2pmu65_sum::int8 AS pop2pmu65_sum,\
     pop2pmo65_sum::int8 AS pop2pmo65_sum,\
     val_struct_sum::float8 AS val_struct_sum,\
     val_cont_sum::float8 AS val_cont_sum,\
     val_vehic_sum::float8 AS val_vehic_sum,\
     med_yr_blt_min::int4 AS med_yr_blt_min,\
     med_yr_blt_max::int4 AS med_yr_blt_max,\
     ground_elv_max::float8 AS ground_elv_max,\
     ground_elv_min::float8 AS ground_elv_min";

fn int(v: Option<i32>) -> FieldValue<'static> {
    FieldValue::Int(v.map(i64::from))
}

type Spec = FieldSpec<StructureSummary>;

/// Output fields of a summary, in declaration order.
pub static SUMMARY_FIELDS: &[Spec] = &[
    Spec::new("num_structures", |s| FieldValue::Int(s.num_structures)),
    Spec::new("yrbuilt_min", |s| int(s.yrbuilt_min)),
    Spec::new("yrbuilt_max", |s| int(s.yrbuilt_max)),
    Spec::new("num_story_mean", |s| FieldValue::Float(s.num_story_mean)),
    Spec::new("resunits_sum", |s| FieldValue::Int(s.resunits_sum)),
    Spec::new("empnum_sum", |s| FieldValue::Int(s.empnum_sum)),
    Spec::new("teachers_sum", |s| FieldValue::Int(s.teachers_sum)),
    Spec::new("students_sum", |s| FieldValue::Int(s.students_sum)),
    Spec::new("sqft_mean", |s| FieldValue::Float(s.sqft_mean)),
    Spec::new("sqft_sum", |s| FieldValue::Float(s.sqft_sum)),
    Spec::new("pop2amu65_sum", |s| FieldValue::Int(s.pop2amu65_sum)),
    Spec::new("pop2amo65_sum", |s| FieldValue::Int(s.pop2amo65_sum)),
    Spec::new("pop2pmu65_sum", |s| FieldValue::Int(s.pop2pmu65_sum)),
    Spec::new("pop2pmo65_sum", |s| FieldValue::Int(s.pop2pmo65_sum)),
    Spec::new("val_struct_sum", |s| FieldValue::Float(s.val_struct_sum)),
    Spec::new("val_cont_sum", |s| FieldValue::Float(s.val_cont_sum)),
    Spec::new("val_vehic_sum", |s| FieldValue::Float(s.val_vehic_sum)),
    Spec::new("med_yr_blt_min", |s| int(s.med_yr_blt_min)),
    Spec::new("med_yr_blt_max", |s| int(s.med_yr_blt_max)),
    Spec::new("ground_elv_max", |s| FieldValue::Float(s.ground_elv_max)),
    Spec::new("ground_elv_min", |s| FieldValue::Float(s.ground_elv_min)),
];
