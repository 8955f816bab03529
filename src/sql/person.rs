//! SQL for the person aggregate: person row plus its current temporal attributes.
//!
//! A temporal row is current when `thrudate IS NULL OR thrudate > CURRENT_DATE`; among current
//! rows of one (person, type) the latest `fromdate` wins, ties broken by the highest id.

use crate::sql::builder::literal;

/// Name slots stored in `personname`, keyed by `personnametype.description`.
pub const NAME_SLOTS: &[&str] = &["fname", "mname", "lname", "nickname"];

/// Measurement slots stored in `physicalcharacteristic`, keyed by `physicalcharacteristictype.description`.
pub const MEASURE_SLOTS: &[(&str, &str)] = &[("height", "height_val"), ("weight", "weight_val")];

pub const PERSON_COLUMNS: &[&str] = &[
    "personal_id_number",
    "birthdate",
    "mothermaidenname",
    "totalyearworkexperience",
    "comment",
    "gender_type_id",
];

const CURRENT_CTES: &str = "\
WITH cur_name AS (
    SELECT pn.id, pn.fromdate, pn.thrudate, pn.person_id, pn.personnametype_id, pn.name,
           pnt.description AS type_description,
           ROW_NUMBER() OVER (PARTITION BY pn.person_id, pn.personnametype_id ORDER BY pn.fromdate DESC, pn.id DESC) AS rn
    FROM personname pn
    JOIN personnametype pnt ON pnt.id = pn.personnametype_id
    WHERE pn.thrudate IS NULL OR pn.thrudate > CURRENT_DATE
), cur_marital AS (
    SELECT ms.id, ms.fromdate, ms.thrudate, ms.person_id, ms.maritalstatustype_id,
           mst.description AS type_description,
           ROW_NUMBER() OVER (PARTITION BY ms.person_id ORDER BY ms.fromdate DESC, ms.id DESC) AS rn
    FROM maritalstatus ms
    JOIN maritalstatustype mst ON mst.id = ms.maritalstatustype_id
    WHERE ms.thrudate IS NULL OR ms.thrudate > CURRENT_DATE
), cur_measure AS (
    SELECT pc.id, pc.fromdate, pc.thrudate, pc.person_id, pc.physicalcharacteristictype_id, pc.val,
           pct.description AS type_description,
           ROW_NUMBER() OVER (PARTITION BY pc.person_id, pc.physicalcharacteristictype_id ORDER BY pc.fromdate DESC, pc.id DESC) AS rn
    FROM physicalcharacteristic pc
    JOIN physicalcharacteristictype pct ON pct.id = pc.physicalcharacteristictype_id
    WHERE pc.thrudate IS NULL OR pc.thrudate > CURRENT_DATE
), cur_citizenship AS (
    SELECT c.id, c.fromdate, c.thrudate, c.person_id, c.country_id,
           ROW_NUMBER() OVER (PARTITION BY c.person_id ORDER BY c.fromdate DESC, c.id DESC) AS rn
    FROM citizenship c
    WHERE c.thrudate IS NULL OR c.thrudate > CURRENT_DATE
)";

fn select_list() -> String {
    let mut cols: Vec<String> = vec!["p.id".into()];
    cols.extend(PERSON_COLUMNS.iter().map(|c| format!("p.{}", c)));
    cols.push("g.description AS gender_description".into());
    for slot in NAME_SLOTS {
        cols.push(format!("{s}.name AS {s}", s = slot));
        for (field, suffix) in [
            ("id", "id"),
            ("fromdate", "fromdate"),
            ("thrudate", "thrudate"),
            ("personnametype_id", "personnametype_id"),
            ("type_description", "personnametype_description"),
        ] {
            cols.push(format!("{s}.{f} AS {s}_{x}", s = slot, f = field, x = suffix));
        }
    }
    cols.extend([
        "ms.maritalstatustype_id AS marital_status_type_id".to_string(),
        "ms.id AS marital_status_id".to_string(),
        "ms.fromdate AS marital_status_fromdate".to_string(),
        "ms.thrudate AS marital_status_thrudate".to_string(),
        "ms.type_description AS marital_status_type_description".to_string(),
    ]);
    for (slot, value) in MEASURE_SLOTS {
        cols.push(format!("{s}.val AS {v}", s = slot, v = value));
        for (field, suffix) in [
            ("id", "id"),
            ("fromdate", "fromdate"),
            ("thrudate", "thrudate"),
            ("physicalcharacteristictype_id", "type_id"),
            ("type_description", "type_description"),
        ] {
            cols.push(format!("{s}.{f} AS {s}_{x}", s = slot, f = field, x = suffix));
        }
    }
    cols.extend([
        "cz.country_id AS country_id".to_string(),
        "cz.id AS citizenship_id".to_string(),
        "cz.fromdate AS citizenship_fromdate".to_string(),
        "cz.thrudate AS citizenship_thrudate".to_string(),
        "co.isocode AS country_isocode".to_string(),
        "co.name_en AS country_name_en".to_string(),
        "co.name_th AS country_name_th".to_string(),
    ]);
    cols.join(",\n       ")
}

fn joins() -> String {
    let mut sql = String::from("FROM person p\nJOIN party pa ON pa.id = p.id\nLEFT JOIN gender_type g ON g.id = p.gender_type_id");
    for slot in NAME_SLOTS {
        sql.push_str(&format!(
            "\nLEFT JOIN cur_name {s} ON {s}.person_id = p.id AND {s}.rn = 1 AND {s}.type_description = {l}",
            s = slot,
            l = literal(slot)
        ));
    }
    sql.push_str("\nLEFT JOIN cur_marital ms ON ms.person_id = p.id AND ms.rn = 1");
    for (slot, _) in MEASURE_SLOTS {
        sql.push_str(&format!(
            "\nLEFT JOIN cur_measure {s} ON {s}.person_id = p.id AND {s}.rn = 1 AND {s}.type_description = {l}",
            s = slot,
            l = literal(slot)
        ));
    }
    sql.push_str("\nLEFT JOIN cur_citizenship cz ON cz.person_id = p.id AND cz.rn = 1");
    sql.push_str("\nLEFT JOIN country co ON co.id = cz.country_id");
    sql
}

/// Every person with current attributes; `$1` (optional) restricts to one id.
pub fn select_people(by_id: bool, limit: Option<u32>, offset: Option<u32>) -> String {
    let filter = if by_id { "\nWHERE p.id = $1" } else { "" };
    let limit = limit
        .map(|n| format!(" LIMIT {}", n.min(crate::sql::MAX_LIMIT)))
        .unwrap_or_default();
    let offset = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    format!(
        "{}\nSELECT {}\n{}{}\nORDER BY p.id{}{}",
        CURRENT_CTES,
        select_list(),
        joins(),
        filter,
        limit,
        offset
    )
}

pub const INSERT_PARTY: &str = "INSERT INTO party DEFAULT VALUES RETURNING id";

pub const INSERT_PERSON: &str = "\
INSERT INTO person (id, personal_id_number, birthdate, mothermaidenname, totalyearworkexperience, comment, gender_type_id)
VALUES ($1, $2, $3, $4, $5, $6, $7)";

pub const UPDATE_PERSON: &str = "\
UPDATE person SET
    personal_id_number = COALESCE($2, personal_id_number),
    birthdate = COALESCE($3, birthdate),
    mothermaidenname = COALESCE($4, mothermaidenname),
    totalyearworkexperience = COALESCE($5, totalyearworkexperience),
    comment = COALESCE($6, comment),
    gender_type_id = COALESCE($7, gender_type_id)
WHERE id = $1";

/// `$1` person, `$2` name, `$3` name type description. Zero rows when the type is not seeded.
pub const INSERT_NAME: &str = "\
INSERT INTO personname (fromdate, person_id, personnametype_id, name)
SELECT CURRENT_DATE, $1, pnt.id, $2 FROM personnametype pnt WHERE pnt.description = $3";

/// `$1` person, `$2` value, `$3` characteristic type description.
pub const INSERT_MEASURE: &str = "\
INSERT INTO physicalcharacteristic (fromdate, person_id, physicalcharacteristictype_id, val)
SELECT CURRENT_DATE, $1, pct.id, $2 FROM physicalcharacteristictype pct WHERE pct.description = $3";

pub const INSERT_MARITAL: &str = "\
INSERT INTO maritalstatus (fromdate, person_id, maritalstatustype_id) VALUES (CURRENT_DATE, $1, $2)";

pub const INSERT_CITIZENSHIP: &str = "\
INSERT INTO citizenship (fromdate, person_id, country_id) VALUES (CURRENT_DATE, $1, $2)";

/// Temporal tables owned by a person, in delete order.
pub const OWNED_TABLES: &[&str] = &["personname", "maritalstatus", "physicalcharacteristic", "citizenship"];

/// Closes a current row opened before today. Zero rows when it was opened today.
pub fn close_current(table: &str) -> String {
    format!(
        "UPDATE {} SET thrudate = CURRENT_DATE WHERE id = $1 AND fromdate < CURRENT_DATE",
        table
    )
}

/// Overwrites the value of a row opened today.
pub fn correct_current(table: &str, column: &str) -> String {
    format!("UPDATE {} SET {} = $2 WHERE id = $1", table, column)
}

pub fn delete_owned(table: &str) -> String {
    format!("DELETE FROM {} WHERE person_id = $1", table)
}
