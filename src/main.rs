//! 3D Print Cost Calculator
//!
//! Command-line front end over the cost engine and its SQLite store.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use print_cost::breakeven;
use print_cost::calculator::{self, PricingInput, SaleDraft};
use print_cost::catalog::Catalog;
use print_cost::db;
use print_cost::extract;
use print_cost::logging;
use print_cost::models::{
    Asset, AssetCategory, AssetSpec, Consumable, EquipmentInstance, EquipmentProfile, JobInputs,
    Licensing, Marketplace, MaterialSelection, ShippingMethod, ShippingSelection, UsageEntry,
};
use print_cost::pricing::{DrivingField, PriceTriple};

#[derive(Parser)]
#[command(name = "print-cost")]
#[command(about = "Cost, pricing and break-even calculator for 3D printed parts")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "print_costs.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load a sample catalog with filaments, supplies and printers
    LoadSample,

    /// List catalog assets
    ListAssets,

    /// List your printers
    ListInstances,

    /// Add or replace one of your printers
    AddInstance {
        /// Id for this printer
        id: String,

        /// Catalog id of the printer model
        #[arg(long)]
        profile: String,

        #[arg(long)]
        nickname: String,

        /// What you actually paid, if different from list price
        #[arg(long)]
        price: Option<f64>,

        /// Months to recover the purchase price
        #[arg(long)]
        recovery_months: Option<f64>,

        /// Expected print hours per month
        #[arg(long)]
        monthly_hours: Option<f64>,
    },

    /// Price a job without saving it
    Quote(JobArgs),

    /// Price a job and save it for break-even tracking
    SaveJob {
        /// Job name
        name: String,

        #[command(flatten)]
        job: JobArgs,
    },

    /// List saved jobs
    ListJobs,

    /// Record a sale against a saved job
    RecordSale {
        job_id: String,

        #[arg(short, long, default_value = "1")]
        quantity: u32,

        /// Unit price, defaults to the job's selling price
        #[arg(long)]
        price: Option<f64>,

        #[command(flatten)]
        shipping: ShippingArgs,

        #[arg(long, default_value = "none")]
        marketplace: String,

        #[arg(long)]
        customer: Option<String>,
    },

    /// Delete a sale and take it off the job's sold count
    DeleteSale { sale_id: String },

    /// Show sales recorded for a job
    Sales { job_id: String },

    /// Break-even projection for a saved job
    BreakEven { job_id: String },

    /// How much of a printer's price sales have earned back
    Recovery { instance_id: String },

    /// Read job data from slicer G-code files
    Extract {
        /// File or directory containing .gcode files
        path: PathBuf,
    },

    /// Import catalog assets from a CSV file
    ImportAssets { csv: PathBuf },

    /// Show settings, updating any that are given
    Settings {
        /// Energy price per kWh
        #[arg(long)]
        energy_price: Option<f64>,

        /// Labor rate per hour
        #[arg(long)]
        labor_rate: Option<f64>,

        /// Filament density in g/cm³
        #[arg(long)]
        density: Option<f64>,
    },
}

#[derive(Args)]
struct ShippingArgs {
    /// local_pickup, dropoff, ups, fedex, ... or a custom carrier id
    #[arg(long, default_value = "local_pickup")]
    shipping: String,

    /// One-way dropoff distance in km
    #[arg(long, default_value = "0")]
    distance: f64,

    /// Fixed shipping cost, replacing the method's rate
    #[arg(long)]
    shipping_cost: Option<f64>,

    /// Packaging used, as asset_id=quantity
    #[arg(long = "packaging", value_parser = parse_usage)]
    packaging: Vec<UsageEntry>,
}

impl ShippingArgs {
    fn selection(&self) -> ShippingSelection {
        ShippingSelection {
            method: ShippingMethod::from(self.shipping.clone()),
            distance_km: self.distance,
            override_cost: self.shipping_cost,
            packaging: self.packaging.clone(),
        }
    }
}

#[derive(Args)]
struct JobArgs {
    /// Filament asset id
    #[arg(short, long)]
    material: Option<String>,

    /// Price per gram, replacing the catalog price
    #[arg(long)]
    price_per_gram: Option<f64>,

    /// Filament used in grams
    #[arg(short, long, default_value = "0")]
    grams: f64,

    /// Print time in hours
    #[arg(long, default_value = "0")]
    hours: f64,

    /// Printer instance id
    #[arg(short, long)]
    printer: Option<String>,

    /// Consumables used, as asset_id=quantity
    #[arg(long = "consumable", value_parser = parse_usage)]
    consumables: Vec<UsageEntry>,

    #[arg(long, default_value = "0")]
    prep_minutes: f64,

    #[arg(long, default_value = "0")]
    post_minutes: f64,

    /// Model license cost
    #[arg(long, default_value = "0")]
    license: f64,

    /// Charge the license on every unit instead of amortizing it
    #[arg(long)]
    license_per_unit: bool,

    /// Author's minimum selling price
    #[arg(long)]
    author_min: Option<f64>,

    /// Expected failure rate in percent
    #[arg(long, default_value = "5")]
    failure_rate: f64,

    #[command(flatten)]
    shipping: ShippingArgs,

    #[arg(long, default_value = "none")]
    marketplace: String,

    /// Target margin in percent
    #[arg(long, conflicts_with_all = ["profit", "price"])]
    margin: Option<f64>,

    /// Target profit per unit
    #[arg(long, conflicts_with = "price")]
    profit: Option<f64>,

    /// Fixed selling price
    #[arg(long)]
    price: Option<f64>,
}

impl JobArgs {
    fn inputs(&self) -> JobInputs {
        JobInputs {
            material: self.material.as_ref().map(|id| MaterialSelection {
                asset_id: id.clone(),
                price_per_gram_override: self.price_per_gram,
            }),
            material_grams: self.grams,
            print_hours: self.hours,
            instance_id: self.printer.clone(),
            consumables: self.consumables.clone(),
            prep_minutes: self.prep_minutes,
            post_process_minutes: self.post_minutes,
            licensing: Licensing {
                cost: self.license,
                per_unit: self.license_per_unit,
            },
            author_min_price: self.author_min,
            failure_rate: self.failure_rate,
            shipping: self.shipping.selection(),
            marketplace: Marketplace::from(self.marketplace.clone()),
        }
    }

    /// Whichever of margin, profit or price was given drives the others
    fn pricing(&self) -> PricingInput {
        match (self.margin, self.profit, self.price) {
            (_, Some(profit), _) => PricingInput {
                driving: DrivingField::Profit,
                current: PriceTriple::from_profit(profit),
            },
            (_, _, Some(price)) => PricingInput {
                driving: DrivingField::Price,
                current: PriceTriple::from_price(price),
            },
            (margin, _, _) => PricingInput {
                driving: DrivingField::Margin,
                current: PriceTriple::from_margin(margin.unwrap_or(30.0)),
            },
        }
    }
}

fn parse_usage(s: &str) -> std::result::Result<UsageEntry, String> {
    let (id, quantity) = s
        .split_once('=')
        .ok_or_else(|| format!("expected asset_id=quantity, got '{s}'"))?;
    let quantity: f64 = quantity
        .trim()
        .parse()
        .map_err(|_| format!("invalid quantity in '{s}'"))?;
    Ok(UsageEntry::new(id.trim(), quantity))
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::ListAssets => {
            let assets = db::list_assets(&conn)?;
            if assets.is_empty() {
                println!("No assets in database. Run 'load-sample' or 'import-assets' first.");
            } else {
                println!("{:<28} {:<32} {:<12} {:>12}", "Id", "Name", "Category", "Cost");
                println!("{}", "-".repeat(86));
                for a in assets {
                    let cost = match &a.spec {
                        AssetSpec::Consumable(c) => format!("{:.3}/{}", c.cost_per_unit, c.unit),
                        AssetSpec::Equipment(e) => format!("{:.2}", e.purchase_price),
                    };
                    println!("{:<28} {:<32} {:<12} {:>12}", a.id, a.name, a.category.as_str(), cost);
                }
            }
        }

        Commands::ListInstances => {
            let catalog = db::load_catalog(&conn)?;
            let instances = db::list_instances(&conn)?;
            if instances.is_empty() {
                println!("No printers yet. Add one with 'add-instance'.");
            }
            for i in instances {
                let profile = catalog.profile_for(&i);
                println!("{} ({})", i.nickname, i.id);
                println!("  Model: {}", i.profile_id);
                println!("  Hours printed: {:.1}", i.usage_hours);
                println!("  Purchase price: {:.2}", i.purchase_price(profile));
                println!("  Depreciation: {:.3}/h", i.depreciation_per_hour(profile));
            }
        }

        Commands::AddInstance {
            id,
            profile,
            nickname,
            price,
            recovery_months,
            monthly_hours,
        } => {
            let is_printer = db::get_asset(&conn, &profile)?
                .is_some_and(|a| a.equipment().is_some());
            if !is_printer {
                bail!("'{}' is not a printer in the catalog", profile);
            }
            let existing_hours = db::get_instance(&conn, &id)?.map(|i| i.usage_hours);
            db::upsert_instance(
                &conn,
                &EquipmentInstance {
                    id: id.clone(),
                    profile_id: profile,
                    nickname,
                    usage_hours: existing_hours.unwrap_or(0.0),
                    actual_purchase_price: price,
                    recovery_months,
                    monthly_usage_hours: monthly_hours,
                    notes: None,
                },
            )?;
            println!("Saved printer '{}'", id);
        }

        Commands::Quote(job) => {
            let catalog = db::load_catalog(&conn)?;
            let settings = db::load_settings(&conn)?;
            let quote = calculator::quote(&job.inputs(), job.pricing(), &catalog, &settings)?;
            println!("{}", quote);
        }

        Commands::SaveJob { name, job } => {
            let catalog = db::load_catalog(&conn)?;
            let settings = db::load_settings(&conn)?;
            let inputs = job.inputs();
            let quote = calculator::quote(&inputs, job.pricing(), &catalog, &settings)?;
            let snapshot = calculator::finalize_job(&name, inputs, &quote, None);
            db::commit_job(&conn, &snapshot)?;
            println!("{}", quote);
            println!("Saved job '{}' as {}", name, snapshot.id);
        }

        Commands::ListJobs => {
            let jobs = db::list_jobs(&conn)?;
            if jobs.is_empty() {
                println!("No saved jobs. Run 'save-job' first.");
            } else {
                println!(
                    "{:<36} {:<24} {:>10} {:>10} {:>6} {:>10} {:>14}",
                    "Id", "Name", "Cost", "Price", "Sold", "Revenue", "Break-even"
                );
                println!("{}", "-".repeat(116));
                for j in jobs {
                    let info = breakeven::for_job(&j);
                    println!(
                        "{:<36} {:<24} {:>10.2} {:>10.2} {:>6} {:>10.2} {:>14}",
                        j.id,
                        j.name,
                        j.unit_cost,
                        j.selling_price,
                        j.units_sold,
                        info.revenue_earned,
                        info.break_even_units.to_string()
                    );
                }
            }
        }

        Commands::RecordSale {
            job_id,
            quantity,
            price,
            shipping,
            marketplace,
            customer,
        } => {
            let job = db::get_job(&conn, &job_id)?
                .ok_or_else(|| anyhow!("job '{}' not found", job_id))?;
            let catalog = db::load_catalog(&conn)?;
            let settings = db::load_settings(&conn)?;

            let draft = SaleDraft {
                quantity,
                unit_price: price,
                shipping: shipping.selection(),
                marketplace: Marketplace::from(marketplace),
                customer,
                notes: None,
            };
            let sale = calculator::prepare_sale(&job, draft, &catalog, &settings)?;
            db::record_sale(&conn, &sale)?;

            println!("Recorded sale {}", sale.id);
            println!("  Revenue:    {:.2}", sale.total_revenue());
            println!("  Shipping:   {:.2}", sale.shipping_cost);
            println!("  Fee:       -{:.2}", sale.marketplace_fee);
            println!("  Net:        {:.2}", sale.net_proceeds());
        }

        Commands::DeleteSale { sale_id } => match db::delete_sale(&conn, &sale_id)? {
            Some(sale) => println!(
                "Deleted sale {} ({} units of job {})",
                sale.id, sale.quantity, sale.job_id
            ),
            None => println!("Sale '{}' not found", sale_id),
        },

        Commands::Sales { job_id } => {
            let sales = db::list_sales_for_job(&conn, &job_id)?;
            if sales.is_empty() {
                println!("No sales recorded for '{}'", job_id);
            }
            for s in sales {
                println!(
                    "{}  {}  {} x {:.2} = {:.2}  ship {:.2} ({})  fee {:.2} ({})",
                    s.id,
                    s.sold_at.format("%Y-%m-%d"),
                    s.quantity,
                    s.unit_price,
                    s.total_revenue(),
                    s.shipping_cost,
                    s.shipping_method.id(),
                    s.marketplace_fee,
                    s.marketplace.id()
                );
            }
        }

        Commands::BreakEven { job_id } => {
            let job = db::get_job(&conn, &job_id)?
                .ok_or_else(|| anyhow!("job '{}' not found", job_id))?;
            let info = breakeven::for_job(&job);

            println!("=== Break-even: {} ===", job.name);
            println!("Fixed costs:     {:.2}", info.fixed_costs_total);
            println!("Unit cost:       {:.2}", job.unit_cost);
            println!("Selling price:   {:.2}", job.selling_price);
            println!("Profit per unit: {:.2}", info.profit_per_unit);
            println!("Break-even at:   {} units", info.break_even_units);
            println!("Sold so far:     {}", job.units_sold);
            println!("Revenue so far:  {:.2}", info.revenue_earned);
            println!("Remaining:       {}", info.remaining_units);
            if let Some(total) = info.total_investment {
                println!("Investment:      {:.2}", total);
            }
            if info.is_recovered {
                println!("Fixed costs recovered.");
            }
        }

        Commands::Recovery { instance_id } => {
            let catalog = db::load_catalog(&conn)?;
            let instance = catalog
                .instance(&instance_id)
                .ok_or_else(|| anyhow!("printer '{}' not found", instance_id))?;
            let jobs = db::list_jobs_for_instance(&conn, &instance_id)?;
            let recovery =
                breakeven::equipment_recovery(instance, catalog.profile_for(instance), &jobs);

            println!("=== Recovery: {} ===", instance.nickname);
            println!("Purchase price:  {:.2}", recovery.purchase_price);
            println!("Jobs:            {}", recovery.job_count);
            println!("Units sold:      {}", recovery.units_sold);
            println!("Profit so far:   {:.2}", recovery.realized_profit);
            println!("Recovered:       {:.1}%", recovery.recovery_percent);
            println!("Remaining:       {:.2}", recovery.remaining_to_recover);
        }

        Commands::Extract { path } => {
            let catalog = db::load_catalog(&conn)?;
            let found = if path.is_dir() {
                extract::extract_jobs(&path)?
            } else {
                let parser = extract::HeaderParser::new()?;
                vec![(path.clone(), parser.parse_file(&path)?)]
            };

            if found.is_empty() {
                println!("No G-code with print data found in {}", path.display());
            }
            for (file, summary) in found {
                println!("{}", file.display());
                println!("  Name:     {}", summary.name);
                if let Some(grams) = summary.filament_grams {
                    println!("  Filament: {:.2} g", grams);
                }
                if let Some(hours) = summary.print_hours {
                    println!("  Time:     {:.2} h", hours);
                }
                if let Some(kind) = &summary.filament_type {
                    println!("  Type:     {}", kind);
                }
                match extract::match_filament(&summary, catalog.assets()) {
                    Some(asset) => println!("  Matched:  {} ({})", asset.name, asset.id),
                    None => println!("  Matched:  no filament in catalog"),
                }
            }
        }

        Commands::ImportAssets { csv } => {
            let file = File::open(&csv).with_context(|| format!("Failed to open {}", csv.display()))?;
            let import = extract::import_assets_csv(file)?;
            for asset in &import.assets {
                db::upsert_asset(&conn, asset)?;
            }
            println!("{}", import);
        }

        Commands::Settings {
            energy_price,
            labor_rate,
            density,
        } => {
            let mut settings = db::load_settings(&conn)?;
            let changed = energy_price.is_some() || labor_rate.is_some() || density.is_some();
            if let Some(price) = energy_price {
                settings.energy_price_per_kwh = price;
            }
            if let Some(rate) = labor_rate {
                settings.labor_hourly_rate = rate;
            }
            if let Some(density) = density {
                settings.material_density = density;
            }
            if changed {
                db::save_settings(&conn, &settings)?;
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

fn consumable(id: &str, name: &str, category: AssetCategory, unit: &str, package_cost: f64, units: f64) -> Asset {
    Asset {
        id: id.to_string(),
        name: name.to_string(),
        category,
        brand: None,
        notes: None,
        spec: AssetSpec::Consumable(Consumable::from_package(unit, package_cost, units)),
    }
}

fn printer(id: &str, name: &str, price: f64, watts: f64, nozzle_cost: f64) -> Asset {
    Asset {
        id: id.to_string(),
        name: name.to_string(),
        category: AssetCategory::Printer,
        brand: Some("Bambu Lab".to_string()),
        notes: None,
        spec: AssetSpec::Equipment(EquipmentProfile {
            purchase_price: price,
            expected_lifespan_hours: 5000.0,
            power_watts: watts,
            tool_cost: nozzle_cost,
            tool_lifespan_cm3: 15000.0,
        }),
    }
}

/// Load a small catalog for trying the calculator out
fn load_sample_data(conn: &Connection) -> Result<()> {
    db::clear_all(conn)?;

    let assets = vec![
        consumable("bambu-pla-basic", "Bambu PLA Basic", AssetCategory::Filament, "g", 19.99, 1000.0),
        consumable("bambu-pla-matte", "Bambu PLA Matte", AssetCategory::Filament, "g", 19.99, 1000.0),
        consumable("bambu-petg-hf", "Bambu PETG HF", AssetCategory::Filament, "g", 19.99, 1000.0),
        consumable("bambu-tpu-95a", "Bambu TPU 95A HF", AssetCategory::Filament, "g", 41.99, 1000.0),
        consumable("sandpaper-120", "Sandpaper 120 grit", AssetCategory::Finishing, "sheet", 5.0, 10.0),
        consumable("primer-spray", "Filler primer", AssetCategory::Finishing, "ml", 14.0, 400.0),
        consumable("glue-stick", "Glue stick", AssetCategory::Consumable, "use", 4.0, 20.0),
        consumable("magnets-6x3", "Magnets 6x3mm", AssetCategory::Consumable, "ea", 9.0, 100.0),
        consumable("mailer-box-small", "Small mailer box", AssetCategory::Packaging, "ea", 30.0, 25.0),
        consumable("bubble-wrap", "Bubble wrap", AssetCategory::Packaging, "m", 18.0, 50.0),
        printer("bambu-a1-mini", "Bambu Lab A1 mini", 299.0, 70.0, 8.0),
        printer("bambu-a1", "Bambu Lab A1", 399.0, 95.0, 8.0),
        printer("bambu-p1s", "Bambu Lab P1S", 699.0, 110.0, 12.0),
    ];
    for asset in &assets {
        db::upsert_asset(conn, asset)?;
    }

    db::upsert_instance(
        conn,
        &EquipmentInstance {
            id: "office-p1s".to_string(),
            profile_id: "bambu-p1s".to_string(),
            nickname: "Office P1S".to_string(),
            usage_hours: 0.0,
            actual_purchase_price: Some(649.0),
            recovery_months: Some(12.0),
            monthly_usage_hours: Some(60.0),
            notes: None,
        },
    )?;

    println!("Loaded {} sample assets and 1 printer", assets.len());
    Ok(())
}
