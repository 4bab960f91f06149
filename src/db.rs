//! Database schema and operations

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::catalog::MemoryCatalog;
use crate::config::Settings;
use crate::models::{
    Asset, AssetCategory, AssetSpec, Consumable, EquipmentInstance, EquipmentProfile, JobInputs,
    JobSnapshot, Marketplace, SaleRecord, ShippingMethod,
};

const SETTINGS_KEY: &str = "settings";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Catalog: consumables and printer models share one table
        CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            brand TEXT,
            notes TEXT,
            kind TEXT NOT NULL CHECK (kind IN ('consumable', 'equipment')),

            unit TEXT,
            cost_per_unit REAL,
            package_cost REAL,
            units_per_package REAL,
            lifespan_uses REAL,

            purchase_price REAL,
            expected_lifespan_hours REAL,
            power_watts REAL,
            tool_cost REAL,
            tool_lifespan_cm3 REAL
        );

        -- Physical printers owned by the user
        CREATE TABLE IF NOT EXISTS equipment_instances (
            id TEXT PRIMARY KEY,
            profile_id TEXT NOT NULL,
            nickname TEXT NOT NULL,
            usage_hours REAL NOT NULL DEFAULT 0,
            actual_purchase_price REAL,
            recovery_months REAL,
            monthly_usage_hours REAL,
            notes TEXT
        );

        -- Committed calculations; costs are frozen at save time
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            instance_id TEXT,
            inputs_json TEXT NOT NULL,
            unit_cost REAL NOT NULL,
            fixed_costs REAL NOT NULL,
            selling_price REAL NOT NULL,
            units_sold INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            unit_price REAL NOT NULL,
            shipping_method TEXT NOT NULL,
            shipping_cost REAL NOT NULL,
            marketplace TEXT NOT NULL,
            marketplace_fee REAL NOT NULL,
            sold_at TEXT NOT NULL,
            customer TEXT,
            notes TEXT
        );

        -- JSON blobs keyed by name
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_instance ON jobs(instance_id);
        CREATE INDEX IF NOT EXISTS idx_sales_job ON sales(job_id);
        "#,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Insert or replace a catalog asset
pub fn upsert_asset(conn: &Connection, asset: &Asset) -> Result<()> {
    let (kind, consumable, equipment) = match &asset.spec {
        AssetSpec::Consumable(c) => ("consumable", Some(c), None),
        AssetSpec::Equipment(e) => ("equipment", None, Some(e)),
    };

    conn.execute(
        "INSERT OR REPLACE INTO assets (
            id, name, category, brand, notes, kind,
            unit, cost_per_unit, package_cost, units_per_package, lifespan_uses,
            purchase_price, expected_lifespan_hours, power_watts, tool_cost, tool_lifespan_cm3
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            asset.id,
            asset.name,
            asset.category.as_str(),
            asset.brand,
            asset.notes,
            kind,
            consumable.map(|c| c.unit.as_str()),
            consumable.map(|c| c.cost_per_unit),
            consumable.and_then(|c| c.package_cost),
            consumable.and_then(|c| c.units_per_package),
            consumable.and_then(|c| c.lifespan_uses),
            equipment.map(|e| e.purchase_price),
            equipment.map(|e| e.expected_lifespan_hours),
            equipment.map(|e| e.power_watts),
            equipment.map(|e| e.tool_cost),
            equipment.map(|e| e.tool_lifespan_cm3),
        ],
    )?;
    Ok(())
}

const ASSET_COLUMNS: &str = "id, name, category, brand, notes, kind,
    unit, cost_per_unit, package_cost, units_per_package, lifespan_uses,
    purchase_price, expected_lifespan_hours, power_watts, tool_cost, tool_lifespan_cm3";

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let kind: String = row.get(5)?;
    let spec = if kind == "equipment" {
        AssetSpec::Equipment(EquipmentProfile {
            purchase_price: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
            expected_lifespan_hours: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
            power_watts: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
            tool_cost: row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
            tool_lifespan_cm3: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
        })
    } else {
        AssetSpec::Consumable(Consumable {
            unit: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            cost_per_unit: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            package_cost: row.get(8)?,
            units_per_package: row.get(9)?,
            lifespan_uses: row.get(10)?,
        })
    };

    Ok(Asset {
        id: row.get(0)?,
        name: row.get(1)?,
        category: AssetCategory::from(row.get::<_, String>(2)?),
        brand: row.get(3)?,
        notes: row.get(4)?,
        spec,
    })
}

pub fn get_asset(conn: &Connection, id: &str) -> Result<Option<Asset>> {
    let asset = conn
        .query_row(
            &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
            [id],
            asset_from_row,
        )
        .optional()?;
    Ok(asset)
}

/// List all assets, printers last
pub fn list_assets(conn: &Connection) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets ORDER BY kind, category, name"
    ))?;

    let rows = stmt.query_map([], asset_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Remove an asset. Jobs that used it keep their frozen costs.
pub fn delete_asset(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM assets WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

// ---------------------------------------------------------------------------
// Equipment instances
// ---------------------------------------------------------------------------

pub fn upsert_instance(conn: &Connection, instance: &EquipmentInstance) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO equipment_instances (
            id, profile_id, nickname, usage_hours, actual_purchase_price,
            recovery_months, monthly_usage_hours, notes
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            instance.id,
            instance.profile_id,
            instance.nickname,
            instance.usage_hours,
            instance.actual_purchase_price,
            instance.recovery_months,
            instance.monthly_usage_hours,
            instance.notes,
        ],
    )?;
    Ok(())
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<EquipmentInstance> {
    Ok(EquipmentInstance {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        nickname: row.get(2)?,
        usage_hours: row.get(3)?,
        actual_purchase_price: row.get(4)?,
        recovery_months: row.get(5)?,
        monthly_usage_hours: row.get(6)?,
        notes: row.get(7)?,
    })
}

const INSTANCE_COLUMNS: &str = "id, profile_id, nickname, usage_hours, actual_purchase_price,
    recovery_months, monthly_usage_hours, notes";

pub fn get_instance(conn: &Connection, id: &str) -> Result<Option<EquipmentInstance>> {
    let instance = conn
        .query_row(
            &format!("SELECT {INSTANCE_COLUMNS} FROM equipment_instances WHERE id = ?1"),
            [id],
            instance_from_row,
        )
        .optional()?;
    Ok(instance)
}

pub fn list_instances(conn: &Connection) -> Result<Vec<EquipmentInstance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM equipment_instances ORDER BY nickname"
    ))?;

    let rows = stmt.query_map([], instance_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Load the whole catalog into memory for a calculation pass
pub fn load_catalog(conn: &Connection) -> Result<MemoryCatalog> {
    Ok(MemoryCatalog::new(list_assets(conn)?, list_instances(conn)?))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

const JOB_COLUMNS: &str = "id, name, inputs_json, unit_cost, fixed_costs, selling_price,
    units_sold, notes, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobSnapshot> {
    let inputs_json: String = row.get(2)?;
    let inputs: JobInputs = serde_json::from_str(&inputs_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(JobSnapshot {
        id: row.get(0)?,
        name: row.get(1)?,
        inputs,
        unit_cost: row.get(3)?,
        fixed_costs: row.get(4)?,
        selling_price: row.get(5)?,
        units_sold: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Insert a new job or overwrite an edited one.
///
/// The sold count is owned by sale recording and is never overwritten here.
pub fn save_job(conn: &Connection, job: &JobSnapshot) -> Result<()> {
    let inputs_json = serde_json::to_string(&job.inputs)?;
    conn.execute(
        "INSERT INTO jobs (
            id, name, instance_id, inputs_json, unit_cost, fixed_costs, selling_price,
            units_sold, notes, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            instance_id = excluded.instance_id,
            inputs_json = excluded.inputs_json,
            unit_cost = excluded.unit_cost,
            fixed_costs = excluded.fixed_costs,
            selling_price = excluded.selling_price,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        rusqlite::params![
            job.id,
            job.name,
            job.inputs.instance_id,
            inputs_json,
            job.unit_cost,
            job.fixed_costs,
            job.selling_price,
            job.units_sold,
            job.notes,
            job.created_at,
            job.updated_at,
        ],
    )?;
    info!(job_id = %job.id, name = %job.name, "saved job");
    Ok(())
}

/// Save a newly committed job and book its print hours on the printer
pub fn commit_job(conn: &Connection, job: &JobSnapshot) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    save_job(&tx, job)?;
    if let Some(instance_id) = &job.inputs.instance_id {
        tx.execute(
            "UPDATE equipment_instances SET usage_hours = usage_hours + ?1 WHERE id = ?2",
            (job.inputs.print_hours, instance_id),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_job(conn: &Connection, id: &str) -> Result<Option<JobSnapshot>> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            [id],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

/// List all jobs, newest first
pub fn list_jobs(conn: &Connection) -> Result<Vec<JobSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"
    ))?;

    let rows = stmt.query_map([], job_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// All jobs printed on one equipment instance
pub fn list_jobs_for_instance(conn: &Connection, instance_id: &str) -> Result<Vec<JobSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE instance_id = ?1 ORDER BY created_at"
    ))?;

    let rows = stmt.query_map([instance_id], job_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Delete a job together with its sales
pub fn delete_job(conn: &Connection, id: &str) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM sales WHERE job_id = ?1", [id])?;
    let deleted = tx.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

const SALE_COLUMNS: &str = "id, job_id, quantity, unit_price, shipping_method, shipping_cost,
    marketplace, marketplace_fee, sold_at, customer, notes";

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<SaleRecord> {
    Ok(SaleRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        quantity: row.get(2)?,
        unit_price: row.get(3)?,
        shipping_method: ShippingMethod::from(row.get::<_, String>(4)?),
        shipping_cost: row.get(5)?,
        marketplace: Marketplace::from(row.get::<_, String>(6)?),
        marketplace_fee: row.get(7)?,
        sold_at: row.get(8)?,
        customer: row.get(9)?,
        notes: row.get(10)?,
    })
}

/// Store a sale and bump its job's sold count in one transaction
pub fn record_sale(conn: &Connection, sale: &SaleRecord) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    let updated = tx.execute(
        "UPDATE jobs SET units_sold = units_sold + ?1, updated_at = ?2 WHERE id = ?3",
        (sale.quantity, Utc::now(), &sale.job_id),
    )?;
    if updated == 0 {
        bail!("job '{}' not found", sale.job_id);
    }

    tx.execute(
        &format!("INSERT INTO sales ({SALE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        rusqlite::params![
            sale.id,
            sale.job_id,
            sale.quantity,
            sale.unit_price,
            sale.shipping_method.id(),
            sale.shipping_cost,
            sale.marketplace.id(),
            sale.marketplace_fee,
            sale.sold_at,
            sale.customer,
            sale.notes,
        ],
    )?;

    tx.commit()?;
    info!(sale_id = %sale.id, job_id = %sale.job_id, quantity = sale.quantity, "recorded sale");
    Ok(())
}

/// Remove a sale and take its quantity back off the job
pub fn delete_sale(conn: &Connection, sale_id: &str) -> Result<Option<SaleRecord>> {
    let tx = conn.unchecked_transaction()?;

    let sale = tx
        .query_row(
            &format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"),
            [sale_id],
            sale_from_row,
        )
        .optional()?;
    let Some(sale) = sale else {
        return Ok(None);
    };

    tx.execute("DELETE FROM sales WHERE id = ?1", [sale_id])?;
    tx.execute(
        "UPDATE jobs SET units_sold = MAX(0, units_sold - ?1), updated_at = ?2 WHERE id = ?3",
        (sale.quantity, Utc::now(), &sale.job_id),
    )?;

    tx.commit()?;
    info!(sale_id, job_id = %sale.job_id, "deleted sale");
    Ok(Some(sale))
}

pub fn list_sales_for_job(conn: &Connection, job_id: &str) -> Result<Vec<SaleRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SALE_COLUMNS} FROM sales WHERE job_id = ?1 ORDER BY sold_at"
    ))?;

    let rows = stmt.query_map([job_id], sale_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Load settings, falling back to defaults when none are stored
pub fn load_settings(conn: &Connection) -> Result<Settings> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [SETTINGS_KEY], |row| row.get(0))
        .optional()?;

    let Some(value) = value else {
        return Ok(Settings::default());
    };

    match serde_json::from_str(&value) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            warn!(error = %e, "stored settings are unreadable, using defaults");
            Ok(Settings::default())
        }
    }
}

pub fn save_settings(conn: &Connection, settings: &Settings) -> Result<()> {
    let value = serde_json::to_string(settings).context("Failed to serialize settings")?;
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        (SETTINGS_KEY, value),
    )?;
    Ok(())
}

/// Clear all records (catalog, jobs, sales); settings are kept
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM sales;
        DELETE FROM jobs;
        DELETE FROM equipment_instances;
        DELETE FROM assets;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Carrier;

    fn open() -> Connection {
        crate::logging::init_test();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn job(id: &str) -> JobSnapshot {
        let now = Utc::now();
        JobSnapshot {
            id: id.to_string(),
            name: "Planter".to_string(),
            created_at: now,
            updated_at: now,
            inputs: JobInputs {
                instance_id: Some("office".to_string()),
                print_hours: 2.5,
                failure_rate: 5.0,
                ..Default::default()
            },
            unit_cost: 3.0,
            fixed_costs: 12.0,
            selling_price: 9.0,
            units_sold: 0,
            notes: None,
        }
    }

    fn sale(id: &str, job_id: &str, quantity: u32) -> SaleRecord {
        SaleRecord {
            id: id.to_string(),
            job_id: job_id.to_string(),
            quantity,
            unit_price: 9.0,
            shipping_method: ShippingMethod::Carrier(Carrier::Usps),
            shipping_cost: 10.0,
            marketplace: Marketplace::Etsy,
            marketplace_fee: 1.5,
            sold_at: Utc::now(),
            customer: Some("Sam".to_string()),
            notes: None,
        }
    }

    #[test]
    fn assets_round_trip_both_kinds() {
        let conn = open();
        let filament = Asset {
            id: "pla".to_string(),
            name: "PLA Basic".to_string(),
            category: AssetCategory::Filament,
            brand: Some("Bambu Lab".to_string()),
            notes: None,
            spec: AssetSpec::Consumable(Consumable::from_package("g", 19.99, 1000.0)),
        };
        let printer = Asset {
            id: "a1".to_string(),
            name: "A1".to_string(),
            category: AssetCategory::Printer,
            brand: None,
            notes: None,
            spec: AssetSpec::Equipment(EquipmentProfile {
                purchase_price: 399.0,
                expected_lifespan_hours: 5000.0,
                power_watts: 95.0,
                tool_cost: 8.0,
                tool_lifespan_cm3: 15000.0,
            }),
        };
        upsert_asset(&conn, &filament).unwrap();
        upsert_asset(&conn, &printer).unwrap();

        assert_eq!(get_asset(&conn, "pla").unwrap(), Some(filament));
        assert_eq!(get_asset(&conn, "a1").unwrap(), Some(printer));
        assert_eq!(list_assets(&conn).unwrap().len(), 2);
        assert!(delete_asset(&conn, "pla").unwrap());
        assert!(get_asset(&conn, "pla").unwrap().is_none());
    }

    #[test]
    fn sale_and_counter_move_together() {
        let conn = open();
        save_job(&conn, &job("j1")).unwrap();

        record_sale(&conn, &sale("s1", "j1", 3)).unwrap();
        record_sale(&conn, &sale("s2", "j1", 2)).unwrap();
        assert_eq!(get_job(&conn, "j1").unwrap().unwrap().units_sold, 5);
        assert_eq!(list_sales_for_job(&conn, "j1").unwrap().len(), 2);

        let removed = delete_sale(&conn, "s1").unwrap().unwrap();
        assert_eq!(removed.quantity, 3);
        assert_eq!(removed.shipping_method, ShippingMethod::Carrier(Carrier::Usps));
        assert_eq!(get_job(&conn, "j1").unwrap().unwrap().units_sold, 2);
        assert!(delete_sale(&conn, "s1").unwrap().is_none());
    }

    #[test]
    fn sale_for_unknown_job_leaves_nothing_behind() {
        let conn = open();
        assert!(record_sale(&conn, &sale("s1", "ghost", 1)).is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn editing_a_job_keeps_its_sold_count() {
        let conn = open();
        save_job(&conn, &job("j1")).unwrap();
        record_sale(&conn, &sale("s1", "j1", 4)).unwrap();

        let mut edited = job("j1");
        edited.selling_price = 11.0;
        save_job(&conn, &edited).unwrap();

        let stored = get_job(&conn, "j1").unwrap().unwrap();
        assert_eq!(stored.selling_price, 11.0);
        assert_eq!(stored.units_sold, 4);
    }

    #[test]
    fn deleting_a_job_drops_its_sales() {
        let conn = open();
        save_job(&conn, &job("j1")).unwrap();
        record_sale(&conn, &sale("s1", "j1", 1)).unwrap();

        assert!(delete_job(&conn, "j1").unwrap());
        assert!(list_sales_for_job(&conn, "j1").unwrap().is_empty());
        assert!(get_job(&conn, "j1").unwrap().is_none());
    }

    #[test]
    fn committing_books_print_hours() {
        let conn = open();
        upsert_instance(
            &conn,
            &EquipmentInstance {
                id: "office".to_string(),
                profile_id: "a1".to_string(),
                nickname: "Office".to_string(),
                usage_hours: 10.0,
                actual_purchase_price: None,
                recovery_months: None,
                monthly_usage_hours: None,
                notes: None,
            },
        )
        .unwrap();

        commit_job(&conn, &job("j1")).unwrap();
        let instance = get_instance(&conn, "office").unwrap().unwrap();
        assert_eq!(instance.usage_hours, 12.5);
        assert_eq!(list_jobs_for_instance(&conn, "office").unwrap().len(), 1);
    }

    #[test]
    fn settings_default_until_saved() {
        let conn = open();
        assert_eq!(load_settings(&conn).unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.energy_price_per_kwh = 0.31;
        save_settings(&conn, &settings).unwrap();
        assert_eq!(load_settings(&conn).unwrap().energy_price_per_kwh, 0.31);

        conn.execute("UPDATE settings SET value = 'not json'", []).unwrap();
        assert_eq!(load_settings(&conn).unwrap(), Settings::default());
    }
}
