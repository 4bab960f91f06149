//! Job and catalog extraction from slicer output and spreadsheets
//!
//! Reads the comment header slicers (Bambu Studio, OrcaSlicer, PrusaSlicer)
//! write into G-code, and CSV catalog exports, producing the same input
//! shapes the calculator already consumes.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{Asset, AssetCategory, AssetSpec, Consumable, EquipmentProfile};

/// What a slicer header says about one print
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcodeSummary {
    pub name: String,
    pub filament_grams: Option<f64>,
    pub print_hours: Option<f64>,
    pub filament_type: Option<String>,
    pub filament_settings_id: Option<String>,
}

impl GcodeSummary {
    pub fn is_empty(&self) -> bool {
        self.filament_grams.is_none() && self.print_hours.is_none() && self.filament_type.is_none()
    }
}

/// Compiled header patterns
pub struct HeaderParser {
    weight: Regex,
    total_time: Regex,
    prusa_time: Regex,
    model_time: Regex,
    duration_part: Regex,
    filament_type: Regex,
    filament_settings: Regex,
    layer_suffix: Regex,
    time_suffix: Regex,
    extension: Regex,
}

impl HeaderParser {
    pub fn new() -> Result<Self> {
        Ok(HeaderParser {
            // Pattern: ; total filament weight [g] : 34.56 (Bambu/Orca)
            //          ; filament used [g] = 12.10, 3.40   (Prusa, one per extruder)
            weight: Regex::new(r"(?m)^;\s*(?:total filament weight|filament used) \[g\]\s*[:=]\s*([\d., ]+)")?,
            total_time: Regex::new(r"total estimated time:\s*([\dhmsd ]+)")?,
            prusa_time: Regex::new(
                r"(?m)^;\s*estimated printing time(?: \(normal mode\))?\s*[:=]\s*([\dhmsd ]+)",
            )?,
            model_time: Regex::new(r"(?m)^;\s*model printing time:\s*([\dhmsd ]+)")?,
            duration_part: Regex::new(r"(\d+)\s*([dhms])")?,
            filament_type: Regex::new(r"(?m)^;\s*filament_type\s*=\s*(.+)$")?,
            filament_settings: Regex::new(r"(?m)^;\s*filament_settings_id\s*=\s*(.+)$")?,
            layer_suffix: Regex::new(r"(?i)_\d+\.\d+mm.*")?,
            time_suffix: Regex::new(r"(?i)_\d+h\d+m.*")?,
            extension: Regex::new(r"(?i)\.(gcode|gc)$")?,
        })
    }

    /// Parse a `1d 2h 3m 4s` style duration into hours
    pub fn parse_duration_hours(&self, text: &str) -> Option<f64> {
        let mut seconds = 0.0;
        let mut matched = false;
        for cap in self.duration_part.captures_iter(text) {
            let value: f64 = cap[1].parse().ok()?;
            seconds += match &cap[2] {
                "d" => value * 86_400.0,
                "h" => value * 3_600.0,
                "m" => value * 60.0,
                _ => value,
            };
            matched = true;
        }
        matched.then_some(seconds / 3_600.0)
    }

    /// "Body3_0.2mm_PETG_8h40m.gcode" → "Body3"
    pub fn clean_job_name(&self, file_name: &str) -> String {
        let name = self.extension.replace(file_name, "");
        let name = self.layer_suffix.replace(&name, "");
        let name = self.time_suffix.replace(&name, "");
        name.replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse the header of a G-code file's contents
    pub fn parse(&self, content: &str, file_name: &str) -> GcodeSummary {
        let filament_grams = self.weight.captures(content).and_then(|cap| {
            let total: f64 = cap[1]
                .split(',')
                .filter_map(|part| part.trim().parse::<f64>().ok())
                .sum();
            (total > 0.0).then_some(total)
        });

        // Prefer the total (with warm-up) over the model-only estimate
        let print_hours = [&self.total_time, &self.prusa_time, &self.model_time]
            .iter()
            .find_map(|re| re.captures(content))
            .and_then(|cap| self.parse_duration_hours(&cap[1]));

        let filament_type = self
            .filament_type
            .captures(content)
            .map(|cap| first_value(&cap[1]))
            .filter(|t| !t.is_empty());

        let filament_settings_id = self
            .filament_settings
            .captures(content)
            .map(|cap| first_value(&cap[1]))
            .filter(|t| !t.is_empty());

        GcodeSummary {
            name: self.clean_job_name(file_name),
            filament_grams,
            print_hours,
            filament_type,
            filament_settings_id,
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<GcodeSummary> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        Ok(self.parse(&content, file_name))
    }
}

fn first_value(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"')
        .to_string()
}

/// Find all G-code files below a directory
pub fn find_gcode_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let is_gcode = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gcode") || ext.eq_ignore_ascii_case("gc"));
        if is_gcode && entry.file_type().is_file() {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Parse every G-code file below `dir`, skipping ones with no usable header
pub fn extract_jobs(dir: &Path) -> Result<Vec<(PathBuf, GcodeSummary)>> {
    let parser = HeaderParser::new()?;
    let mut summaries = Vec::new();
    for path in find_gcode_files(dir)? {
        let summary = parser.parse_file(&path)?;
        if summary.is_empty() {
            warn!(file = %path.display(), "no print data in G-code header");
            continue;
        }
        debug!(file = %path.display(), ?summary, "parsed G-code");
        summaries.push((path, summary));
    }
    Ok(summaries)
}

/// Pick the filament asset that best matches a parsed header.
///
/// A filament whose name appears in the settings id wins; otherwise the
/// first filament whose name contains the filament type.
pub fn match_filament<'a>(
    summary: &GcodeSummary,
    assets: impl IntoIterator<Item = &'a Asset>,
) -> Option<&'a Asset> {
    let filaments: Vec<&Asset> = assets
        .into_iter()
        .filter(|a| a.category == AssetCategory::Filament)
        .collect();

    if let Some(settings_id) = &summary.filament_settings_id {
        let settings_id = settings_id.to_lowercase();
        let best = filaments
            .iter()
            .copied()
            .filter(|a| settings_id.contains(&a.name.to_lowercase()))
            .max_by_key(|a| a.name.len());
        if let Some(asset) = best {
            return Some(asset);
        }
    }

    let filament_type = summary.filament_type.as_ref()?.to_lowercase();
    let mut by_type: Vec<&Asset> = filaments
        .into_iter()
        .filter(|a| a.name.to_lowercase().contains(&filament_type))
        .collect();
    by_type.sort_by(|a, b| a.name.cmp(&b.name));
    by_type.into_iter().next()
}

/// Counts from a CSV catalog import
#[derive(Debug, Default)]
pub struct CsvImport {
    pub assets: Vec<Asset>,
    pub skipped: Vec<(usize, String)>,
}

impl fmt::Display for CsvImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Catalog Import ===")?;
        writeln!(f, "Imported: {}", self.assets.len())?;
        writeln!(f, "Skipped:  {}", self.skipped.len())?;
        for (line, reason) in &self.skipped {
            writeln!(f, "  row {}: {}", line, reason)?;
        }
        Ok(())
    }
}

/// Asset id derived from a name: "Bambu PLA Basic" → "bambu-pla-basic"
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn column<'r>(headers: &[String], record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
}

fn non_negative(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Import catalog assets from CSV.
///
/// Header names are matched case-insensitively. Printer rows need
/// `purchasePrice` and `wattage`; every other row needs `unit`,
/// `packageCost` and `unitsPerPackage`. Bad rows are skipped, not fatal.
pub fn import_assets_csv<R: Read>(reader: R) -> Result<CsvImport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()
        .context("CSV has no header row")?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut import = CsvImport::default();

    for (index, record) in csv_reader.records().enumerate() {
        // Header is line 1
        let line = index + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                import.skipped.push((line, e.to_string()));
                continue;
            }
        };
        match asset_from_csv(&headers, &record) {
            Ok(asset) => import.assets.push(asset),
            Err(reason) => {
                warn!(line, %reason, "skipping catalog row");
                import.skipped.push((line, reason));
            }
        }
    }

    Ok(import)
}

fn asset_from_csv(headers: &[String], record: &csv::StringRecord) -> std::result::Result<Asset, String> {
    let field = |name: &str| column(headers, record, name);
    let name = field("name").ok_or("name is required")?.to_string();
    let category = AssetCategory::from(field("category").unwrap_or("consumable").to_string());

    let spec = if category == AssetCategory::Printer {
        let purchase_price = non_negative(field("purchaseprice")).ok_or("purchase price must be a non-negative number")?;
        let power_watts = non_negative(field("wattage")).ok_or("wattage must be a non-negative number")?;
        AssetSpec::Equipment(EquipmentProfile {
            purchase_price,
            expected_lifespan_hours: non_negative(field("expectedlifespanhours")).unwrap_or(5000.0),
            power_watts,
            tool_cost: non_negative(field("nozzlecost")).unwrap_or(10.0),
            tool_lifespan_cm3: non_negative(field("nozzlelifespancm3")).unwrap_or(15000.0),
        })
    } else {
        let unit = field("unit").ok_or("unit is required (e.g. g, ml, sheet, ea)")?;
        let package_cost = non_negative(field("packagecost")).ok_or("package cost must be a non-negative number")?;
        let units_per_package = non_negative(field("unitsperpackage"))
            .filter(|u| *u > 0.0)
            .ok_or("units per package must be greater than zero")?;

        let mut consumable = Consumable::from_package(unit, package_cost, units_per_package);
        consumable.lifespan_uses = non_negative(field("lifespanunits"));
        AssetSpec::Consumable(consumable)
    };

    Ok(Asset {
        id: slug(&name),
        name,
        category,
        brand: field("brand").map(str::to_string),
        notes: field("notes").map(str::to_string),
        spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAMBU_HEADER: &str = "; HEADER_BLOCK_START
; BambuStudio 01.09.00.70
; model printing time: 1h 52m 10s; total estimated time: 2h 0m 4s
; total layer number: 120
; total filament weight [g] : 34.56
; HEADER_BLOCK_END
; filament_type = PLA;PLA
; filament_settings_id = \"Bambu PLA Basic @BBL A1M\";\"Bambu PLA Basic @BBL A1M\"
G28
";

    const PRUSA_FOOTER: &str = "G1 X10 Y10
; filament used [g] = 12.10, 3.40
; estimated printing time (normal mode) = 1d 2h 30m 0s
; filament_type = PETG
";

    fn parser() -> HeaderParser {
        HeaderParser::new().unwrap()
    }

    fn filament(name: &str) -> Asset {
        Asset {
            id: slug(name),
            name: name.to_string(),
            category: AssetCategory::Filament,
            brand: None,
            notes: None,
            spec: AssetSpec::Consumable(Consumable::from_package("g", 20.0, 1000.0)),
        }
    }

    #[test]
    fn bambu_header() {
        let summary = parser().parse(BAMBU_HEADER, "Planter_0.2mm_PLA_2h0m.gcode");
        assert_eq!(summary.name, "Planter");
        assert_eq!(summary.filament_grams, Some(34.56));
        let hours = summary.print_hours.unwrap();
        assert!((hours - (2.0 + 4.0 / 3600.0)).abs() < 1e-9);
        assert_eq!(summary.filament_type.as_deref(), Some("PLA"));
        assert_eq!(summary.filament_settings_id.as_deref(), Some("Bambu PLA Basic @BBL A1M"));
    }

    #[test]
    fn prusa_footer_sums_extruders() {
        let summary = parser().parse(PRUSA_FOOTER, "bracket_v2.gcode");
        assert_eq!(summary.name, "bracket v2");
        assert!((summary.filament_grams.unwrap() - 15.5).abs() < 1e-9);
        assert!((summary.print_hours.unwrap() - 26.5).abs() < 1e-9);
        assert_eq!(summary.filament_type.as_deref(), Some("PETG"));
    }

    #[test]
    fn plain_gcode_has_nothing() {
        let summary = parser().parse("G28\nG1 X0 Y0\n", "cube.gcode");
        assert!(summary.is_empty());
        assert_eq!(summary.name, "cube");
    }

    #[test]
    fn durations() {
        assert_eq!(parser().parse_duration_hours("45m"), Some(0.75));
        assert_eq!(parser().parse_duration_hours("1d 0h"), Some(24.0));
        assert_eq!(parser().parse_duration_hours("soon"), None);
    }

    #[test]
    fn filament_matching_prefers_settings_id() {
        let assets = vec![
            filament("Bambu PLA Matte"),
            filament("Bambu PLA Basic"),
            filament("Generic PETG"),
        ];
        let summary = parser().parse(BAMBU_HEADER, "planter.gcode");
        assert_eq!(match_filament(&summary, &assets).unwrap().name, "Bambu PLA Basic");

        let petg = parser().parse(PRUSA_FOOTER, "bracket.gcode");
        assert_eq!(match_filament(&petg, &assets).unwrap().name, "Generic PETG");
    }

    #[test]
    fn directory_scan_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("planter.gcode"), BAMBU_HEADER).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("bracket.GC"), PRUSA_FOOTER).unwrap();
        fs::write(dir.path().join("empty.gcode"), "G28\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "; filament used [g] = 1").unwrap();

        assert_eq!(find_gcode_files(dir.path()).unwrap().len(), 3);
        let jobs = extract_jobs(dir.path()).unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn csv_import_keeps_good_rows() {
        let csv = "name,category,brand,unit,packageCost,unitsPerPackage,lifespanUnits,purchasePrice,wattage
Sandpaper 220,finishing,,sheet,6,10,3,,
Mailer Box,packaging,Uline,ea,30,25,,,
Broken Row,consumable,,ea,abc,10,,,
Bambu A1,printer,Bambu Lab,,,,,399,95
No Watts,printer,,,,,,399,
";
        let import = import_assets_csv(csv.as_bytes()).unwrap();
        assert_eq!(import.assets.len(), 3);
        assert_eq!(import.skipped.len(), 2);
        assert_eq!(import.skipped[0].0, 4);

        let sandpaper = &import.assets[0];
        assert_eq!(sandpaper.id, "sandpaper-220");
        assert_eq!(sandpaper.cost_per_unit(), Some(0.6));

        let printer = import.assets[2].equipment().unwrap();
        assert_eq!(printer.tool_lifespan_cm3, 15000.0);
        assert_eq!(import.assets[1].brand.as_deref(), Some("Uline"));
    }
}
