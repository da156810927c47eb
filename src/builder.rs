//! Building a [`ConfigSnapshot`] from raw spreadsheet rows.
use std::collections::{hash_map::Entry, HashMap};

use chrono::{DateTime, Utc};

use crate::{
    snapshot::{
        ConfigSnapshot, Feature, Layer, LayerIdentity, VariantAllocation, VariantValue,
        BUCKET_COUNT, SLOTS_PER_BUCKET,
    },
    Error, Result,
};

/// A row of cell values. Trailing empty cells may be missing.
pub type Row = Vec<String>;

const FLAGS_SHEET: &str = "flags";
const LAYERS_SHEET: &str = "layers";

/// Raw configuration as pulled from the source. Both sequences start with a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRows {
    /// `[feature_key, layer_name, variant_key, percentage]`
    pub flags: Vec<Row>,
    /// `[layer_name, layer_version]`
    pub layers: Vec<Row>,
    /// Time at which the rows were pulled.
    pub fetched_at: DateTime<Utc>,
}

impl SheetRows {
    /// Create rows stamped with the current time.
    pub fn new(flags: Vec<Row>, layers: Vec<Row>) -> SheetRows {
        SheetRows {
            flags,
            layers,
            fetched_at: Utc::now(),
        }
    }
}

/// Cursor over one data row that produces located parse errors.
struct Cells<'a> {
    sheet: &'static str,
    /// 1-based, header included.
    row: usize,
    cells: &'a [String],
}

impl<'a> Cells<'a> {
    fn get(&self, index: usize, column: &'static str) -> Result<&'a str> {
        self.cells
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.error(column, "missing value".to_owned()))
    }

    fn parse<T>(&self, index: usize, column: &'static str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.get(index, column)?;
        value
            .parse()
            .map_err(|err| self.error(column, format!("{value:?} must be an integer: {err}")))
    }

    fn error(&self, column: &'static str, reason: String) -> Error {
        Error::Parse {
            sheet: self.sheet,
            row: self.row,
            column,
            reason,
        }
    }
}

/// Data rows of a sheet: header skipped, blank rows dropped.
fn data_rows<'a>(sheet: &'static str, rows: &'a [Row]) -> impl Iterator<Item = Cells<'a>> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| row.iter().any(|cell| !cell.is_empty()))
        .map(move |(i, row)| Cells {
            sheet,
            row: i + 1,
            cells: row,
        })
}

impl ConfigSnapshot {
    /// Build a snapshot from raw rows.
    ///
    /// Feature rows are applied in order: each row claims the next `percentage * 10` free slots
    /// of its layer. Any invalid row aborts the whole build.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`] if a required cell is missing or an integer cell is malformed.
    /// - [`Error::MissingLayer`] if a feature references an undefined layer.
    /// - [`Error::FeatureLayerConflict`] if a feature's rows name different layers.
    /// - [`Error::CapacityExceeded`] if a layer's allocations exceed [`BUCKET_COUNT`] slots.
    pub fn build(rows: &SheetRows) -> Result<ConfigSnapshot> {
        let mut layers = HashMap::new();
        for cells in data_rows(LAYERS_SHEET, &rows.layers) {
            let name = cells.get(0, "layer_name")?;
            let version: i64 = cells.parse(1, "layer_version")?;
            let layer = Layer::new(LayerIdentity::new(name, version));
            if layers.insert(name.to_owned(), layer).is_some() {
                log::warn!(target: "featuresheet", layer = name, row = cells.row; "duplicate layer definition, the later row wins");
            }
        }

        let mut features: HashMap<String, Feature> = HashMap::new();
        for cells in data_rows(FLAGS_SHEET, &rows.flags) {
            let feature_key = cells.get(0, "feature_key")?;
            let layer_name = cells.get(1, "layer_name")?;
            let variant: VariantValue = cells.get(2, "variant_key")?.into();
            let percentage: u32 = cells.parse(3, "percentage")?;

            let layer = layers
                .get_mut(layer_name)
                .ok_or_else(|| Error::MissingLayer {
                    feature: feature_key.to_owned(),
                    layer: layer_name.to_owned(),
                })?;

            let feature = match features.entry(feature_key.to_owned()) {
                Entry::Occupied(entry) => {
                    let feature = entry.into_mut();
                    if feature.layer != layer_name {
                        return Err(Error::FeatureLayerConflict {
                            feature: feature_key.to_owned(),
                            first: feature.layer.clone(),
                            second: layer_name.to_owned(),
                        });
                    }
                    feature
                }
                Entry::Vacant(entry) => entry.insert(Feature {
                    key: feature_key.to_owned(),
                    layer: layer_name.to_owned(),
                    variants: HashMap::new(),
                }),
            };

            // Saturating so that absurd percentages surface as a capacity error, not an overflow.
            let slots = (percentage as usize).saturating_mul(SLOTS_PER_BUCKET);
            layer.fill(&variant, slots)?;

            feature
                .variants
                .entry(variant.clone())
                .and_modify(|allocation| allocation.percentage += percentage)
                .or_insert(VariantAllocation {
                    variant,
                    percentage,
                });
        }

        if let Some(layer) = layers.values().find(|layer| layer.filled() > BUCKET_COUNT) {
            return Err(Error::CapacityExceeded {
                layer: layer.name().to_owned(),
                requested: layer.filled(),
                available: BUCKET_COUNT,
            });
        }

        Ok(ConfigSnapshot {
            features,
            layers,
            fetched_at: rows.fetched_at,
        })
    }
}
