//! Statically declared output field tables.
//!
//! Each record type exposes an ordered list of [`FieldSpec`]s. Property
//! encoding walks the list instead of inspecting the record at runtime, so the
//! output shape is fixed at compile time.

use crate::encoder::FeatureRecord;
use crate::error::Result;
use std::fmt::Write;

/// A borrowed field value with its output kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Rendered as a JSON integer.
    Int(Option<i64>),
    /// Rendered with two decimal places.
    Float(Option<f64>),
    /// Rendered as a JSON string.
    Text(Option<&'a str>),
}

/// One output field: its property name and accessor.
pub struct FieldSpec<R> {
    pub name: &'static str,
    pub get: fn(&R) -> FieldValue<'_>,
}

impl<R> FieldSpec<R> {
    pub const fn new(name: &'static str, get: fn(&R) -> FieldValue<'_>) -> Self {
        Self { name, get }
    }
}

/// Append `value` in its JSON form.
pub fn write_value(out: &mut String, value: FieldValue<'_>) -> serde_json::Result<()> {
    match value {
        FieldValue::Int(Some(v)) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::Float(Some(v)) if v.is_finite() => {
            let _ = write!(out, "{v:.2}");
        }
        FieldValue::Text(Some(s)) => out.push_str(&serde_json::to_string(s)?),
        _ => out.push_str("null"),
    }
    Ok(())
}

/// Append `"name":value` pairs for every field, without surrounding braces.
///
/// `leading_comma` controls whether the first pair is preceded by a comma,
/// for callers that emit their own pairs first.
pub fn write_fields<R>(
    out: &mut String,
    fields: &[FieldSpec<R>],
    record: &R,
    leading_comma: bool,
) -> serde_json::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 || leading_comma {
            out.push(',');
        }
        out.push('"');
        out.push_str(field.name);
        out.push_str("\":");
        write_value(out, (field.get)(record))?;
    }
    Ok(())
}

/// Append a complete properties object for `record`.
pub fn write_properties<R>(
    out: &mut String,
    fields: &[FieldSpec<R>],
    record: &R,
) -> serde_json::Result<()> {
    out.push('{');
    write_fields(out, fields, record, false)?;
    out.push('}');
    Ok(())
}

/// One row of the structure inventory.
///
/// Every column is nullable in the source table.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct StructureRecord {
    pub fd_id: Option<i32>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub cbfips: Option<String>,
    pub occtype: Option<String>,
    pub yrbuilt: Option<i32>,
    pub num_story: Option<i32>,
    pub resunits: Option<i32>,
    pub stacked: Option<String>,
    pub source: Option<String>,
    pub empnum: Option<i32>,
    pub teachers: Option<i32>,
    pub students: Option<i32>,
    pub sqft: Option<f64>,
    pub pop2amu65: Option<i32>,
    pub pop2amo65: Option<i32>,
    pub pop2pmu65: Option<i32>,
    pub pop2pmo65: Option<i32>,
    pub st_damcat: Option<String>,
    pub basement: Option<i32>,
    pub bldgtype: Option<String>,
    pub found_ht: Option<f64>,
    pub found_type: Option<String>,
    pub val_struct: Option<f64>,
    pub val_cont: Option<f64>,
    pub val_vehic: Option<f64>,
    pub med_yr_blt: Option<i32>,
    pub fipsentry: Option<i32>,
    pub firmzone: Option<String>,
    pub o65disable: Option<f64>,
    pub u65disable: Option<f64>,
    pub ground_elv: Option<f64>,
}

/// Column list of [`StructureRecord`], in table order.
pub const STRUCTURE_SELECT: &str = "SELECT fd_id,x,y,cbfips,occtype,yrbuilt,num_story,resunits,stacked,\
     source,empnum,teachers,students,sqft,pop2amu65,pop2amo65,pop2pmu65,\
     pop2pmo65,st_damcat,basement,bldgtype,found_ht,found_type,val_struct,\
     val_cont,val_vehic,med_yr_blt,fipsentry,firmzone,o65disable,\
     u65disable,ground_elv FROM nsi";

fn int(v: Option<i32>) -> FieldValue<'static> {
    FieldValue::Int(v.map(i64::from))
}

type Spec = FieldSpec<StructureRecord>;

/// Property fields of a structure feature. `x` and `y` form the geometry.
pub static STRUCTURE_FIELDS: &[Spec] = &[
    Spec::new("fd_id", |r| int(r.fd_id)),
    Spec::new("cbfips", |r| FieldValue::Text(r.cbfips.as_deref())),
    Spec::new("occtype", |r| FieldValue::Text(r.occtype.as_deref())),
    Spec::new("yrbuilt", |r| int(r.yrbuilt)),
    Spec::new("num_story", |r| int(r.num_story)),
    Spec::new("resunits", |r| int(r.resunits)),
    Spec::new("stacked", |r| FieldValue::Text(r.stacked.as_deref())),
    Spec::new("source", |r| FieldValue::Text(r.source.as_deref())),
    Spec::new("empnum", |r| int(r.empnum)),
    Spec::new("teachers", |r| int(r.teachers)),
    Spec::new("students", |r| int(r.students)),
    Spec::new("sqft", |r| FieldValue::Float(r.sqft)),
    Spec::new("pop2amu65", |r| int(r.pop2amu65)),
    Spec::new("pop2amo65", |r| int(r.pop2amo65)),
    Spec::new("pop2pmu65", |r| int(r.pop2pmu65)),
    Spec::new("pop2pmo65", |r| int(r.pop2pmo65)),
    Spec::new("st_damcat", |r| FieldValue::Text(r.st_damcat.as_deref())),
    Spec::new("basement", |r| int(r.basement)),
    Spec::new("bldgtype", |r| FieldValue::Text(r.bldgtype.as_deref())),
    Spec::new("found_ht", |r| FieldValue::Float(r.found_ht)),
    Spec::new("found_type", |r| FieldValue::Text(r.found_type.as_deref())),
    Spec::new("val_struct", |r| FieldValue::Float(r.val_struct)),
    Spec::new("val_cont", |r| FieldValue::Float(r.val_cont)),
    Spec::new("val_vehic", |r| FieldValue::Float(r.val_vehic)),
    Spec::new("med_yr_blt", |r| int(r.med_yr_blt)),
    Spec::new("fipsentry", |r| int(r.fipsentry)),
    Spec::new("firmzone", |r| FieldValue::Text(r.firmzone.as_deref())),
    Spec::new("o65disable", |r| FieldValue::Float(r.o65disable)),
    Spec::new("u65disable", |r| FieldValue::Float(r.u65disable)),
    Spec::new("ground_elv", |r| FieldValue::Float(r.ground_elv)),
];

impl FeatureRecord for StructureRecord {
    fn write_geometry(&self, out: &mut String) -> Result<()> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                let _ = write!(out, r#"{{"type":"Point","coordinates":[{x:.6},{y:.6}]}}"#);
            }
            _ => out.push_str("null"),
        }
        Ok(())
    }

    fn write_properties(&self, out: &mut String) -> Result<()> {
        write_properties(out, STRUCTURE_FIELDS, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_rendering() {
        let mut out = String::new();
        write_value(&mut out, FieldValue::Int(Some(-7))).unwrap();
        out.push(' ');
        write_value(&mut out, FieldValue::Float(Some(1.005_1))).unwrap();
        out.push(' ');
        write_value(&mut out, FieldValue::Float(Some(f64::INFINITY))).unwrap();
        out.push(' ');
        write_value(&mut out, FieldValue::Text(Some("a\"b"))).unwrap();
        out.push(' ');
        write_value(&mut out, FieldValue::Text(None)).unwrap();
        assert_eq!(out, r#"-7 1.01 null "a\"b" null"#);
    }

    #[test]
    fn test_structure_properties_exclude_position() {
        let rec = StructureRecord {
            fd_id: Some(42),
            x: Some(-90.5),
            y: Some(38.25),
            cbfips: Some("290950001001000".into()),
            sqft: Some(1500.0),
            ..Default::default()
        };
        let mut out = String::new();
        write_properties(&mut out, STRUCTURE_FIELDS, &rec).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 30);
        assert!(!obj.contains_key("x"));
        assert!(!obj.contains_key("y"));
        assert_eq!(obj["fd_id"], 42);
        assert_eq!(obj["cbfips"], "290950001001000");
        assert!(obj["occtype"].is_null());
        assert!(out.contains(r#""sqft":1500.00"#));
    }

    #[test]
    fn test_point_geometry() {
        let rec = StructureRecord {
            x: Some(-90.5),
            y: Some(38.25),
            ..Default::default()
        };
        let mut out = String::new();
        rec.write_geometry(&mut out).unwrap();
        assert_eq!(out, r#"{"type":"Point","coordinates":[-90.500000,38.250000]}"#);

        let mut out = String::new();
        StructureRecord::default().write_geometry(&mut out).unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn test_field_order_follows_table() {
        let names: Vec<_> = STRUCTURE_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.first(), Some(&"fd_id"));
        assert_eq!(names.last(), Some(&"ground_elv"));
        for name in &names {
            assert!(STRUCTURE_SELECT.contains(name));
        }
    }
}
