//! Catalog interpretation.
//!
//! The catalog is itself a table, stored in a fixed tree rooted at page 4.
//! Every leaf record is a *definition*, describing a table, column, index, long-value
//! tree, or callback, in ordinary record layout, decoded here against the
//! catalog's own well-known bootstrap schema.
//!
//! Definitions group by their `father_data_page` field: one TABLE record
//! anchors each group, COLUMN records declare the record layout in
//! ascending column-ID order, INDEX records declare alternate sort orders,
//! and a LONG_VALUE record names the tree that holds out-of-row values.
//! CALLBACK records are legacy trigger hooks and are skipped.
//!
//! A table may name a template table; the template's columns are merged in
//! beneath the derived table's own, which win on identifier collision.

use serde::Serialize;

use crate::ese::column_types::ColumnType;
use crate::ese::constants::*;
use crate::ese::record::{DateTimeRepr, DecodedRecord, RecordDecoder, Value};
use crate::ese::tree::{LeafIter, PageReader};
use crate::EseError;

/// One column of a table.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDefinition {
    /// Table-unique column identifier; also selects the storage region.
    pub identifier: u32,
    pub name: String,
    pub column_type: ColumnType,
    /// Codepage for text columns (1200 = UTF-16LE).
    pub codepage: u32,
    /// Column flags from the catalog.
    pub flags: u32,
    /// Declared size (width for fixed text/binary columns).
    pub size: u32,
    /// Default value bytes, when the catalog carries one.
    pub default_value: Option<Vec<u8>>,
    /// Per-column DATE_TIME interpretation override.
    #[serde(skip)]
    pub date_time_repr: Option<DateTimeRepr>,
}

/// One index over a table.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDefinition {
    pub identifier: u32,
    pub name: String,
    /// Root page of the index tree.
    pub root_page: u32,
    pub flags: u32,
}

/// One table: its trees and its schema.
#[derive(Debug, Clone, Serialize)]
pub struct TableDefinition {
    /// Object identifier; equals the table tree's FDP.
    pub identifier: u32,
    pub name: String,
    /// Root page of the data tree.
    pub root_page: u32,
    /// Columns in ascending identifier order.
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    /// Root page of the long-value tree, when the table has one.
    pub long_value_root: Option<u32>,
    /// Template this table inherits columns from.
    pub template_name: Option<String>,
}

impl TableDefinition {
    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A raw catalog definition record.
#[derive(Debug, Clone)]
struct CatalogDefinition {
    father_data_page: u32,
    definition_type: u16,
    identifier: u32,
    coltyp_or_fdp: u32,
    space_usage: u32,
    flags: u32,
    pages_or_locale: u32,
    name: String,
    template_name: Option<String>,
    default_value: Option<Vec<u8>>,
}

/// The catalog's own schema. The catalog predates itself, so its layout is
/// fixed by the engine rather than described on disk.
pub fn bootstrap_columns() -> Vec<ColumnDefinition> {
    fn fixed(identifier: u32, name: &str, column_type: ColumnType) -> ColumnDefinition {
        ColumnDefinition {
            identifier,
            name: name.to_string(),
            column_type,
            codepage: 0,
            flags: 0,
            size: column_type.fixed_size().unwrap_or(0) as u32,
            default_value: None,
            date_time_repr: None,
        }
    }
    fn variable(identifier: u32, name: &str, column_type: ColumnType, codepage: u32) -> ColumnDefinition {
        ColumnDefinition {
            identifier,
            name: name.to_string(),
            column_type,
            codepage,
            flags: 0,
            size: 0,
            default_value: None,
            date_time_repr: None,
        }
    }

    vec![
        fixed(1, "ObjidTable", ColumnType::Long),
        fixed(2, "Type", ColumnType::Short),
        fixed(3, "Id", ColumnType::Long),
        fixed(4, "ColtypOrPgnoFDP", ColumnType::Long),
        fixed(5, "SpaceUsage", ColumnType::Long),
        fixed(6, "Flags", ColumnType::Long),
        fixed(7, "PagesOrLocale", ColumnType::Long),
        fixed(8, "RootFlag", ColumnType::Boolean),
        fixed(9, "RecordOffset", ColumnType::Short),
        fixed(10, "LCMapFlags", ColumnType::Long),
        fixed(11, "KeyMost", ColumnType::UnsignedShort),
        variable(128, "Name", ColumnType::Text, CODEPAGE_WINDOWS_1252),
        variable(129, "Stats", ColumnType::Binary, 0),
        variable(130, "TemplateTable", ColumnType::Text, CODEPAGE_WINDOWS_1252),
        variable(131, "DefaultValue", ColumnType::Binary, 0),
        variable(132, "KeyFldIDs", ColumnType::Binary, 0),
    ]
}

/// All tables of a database, interpreted from the catalog tree.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub tables: Vec<TableDefinition>,
}

impl Catalog {
    /// Walk the catalog tree at page 4 and interpret its definitions.
    ///
    /// `new_tagged_format` selects the tagged-region layout of the file.
    pub fn read(reader: &dyn PageReader, new_tagged_format: bool) -> Result<Self, EseError> {
        let columns = bootstrap_columns();
        let decoder = RecordDecoder::new(&columns, new_tagged_format, DateTimeRepr::OleDouble);

        let mut definitions = Vec::new();
        for entry in LeafIter::new(reader, PAGE_NUMBER_CATALOG) {
            let entry = entry?;
            let decoded = match decoder.decode(&entry.data) {
                Ok(decoded) => decoded,
                Err(error) => {
                    reader.warn(format!(
                        "Catalog record on page {} tag {} skipped: {}",
                        entry.page_number, entry.tag_index, error
                    ));
                    continue;
                }
            };
            match parse_definition(&decoder, &columns, &decoded) {
                Ok(definition) => definitions.push(definition),
                Err(error) => reader.warn(format!(
                    "Catalog definition on page {} tag {} skipped: {}",
                    entry.page_number, entry.tag_index, error
                )),
            }
        }

        Self::assemble(definitions)
    }

    fn assemble(definitions: Vec<CatalogDefinition>) -> Result<Self, EseError> {
        let mut tables: Vec<TableDefinition> = Vec::new();

        for definition in &definitions {
            if definition.definition_type == CATALOG_TYPE_TABLE {
                tables.push(TableDefinition {
                    identifier: definition.identifier,
                    name: definition.name.clone(),
                    root_page: definition.coltyp_or_fdp,
                    columns: Vec::new(),
                    indexes: Vec::new(),
                    long_value_root: None,
                    template_name: definition.template_name.clone(),
                });
            }
        }
        if tables.is_empty() {
            return Err(EseError::Format("Catalog declares no tables".into()));
        }

        for definition in &definitions {
            let Some(table) = tables
                .iter_mut()
                .find(|t| t.identifier == definition.father_data_page)
            else {
                continue;
            };
            match definition.definition_type {
                CATALOG_TYPE_TABLE => {}
                CATALOG_TYPE_COLUMN => {
                    let column_type = ColumnType::from_u32(definition.coltyp_or_fdp)
                        .ok_or_else(|| {
                            EseError::Unsupported(format!(
                                "Column {} of table {} has unknown type {}",
                                definition.name, table.name, definition.coltyp_or_fdp
                            ))
                        })?;
                    table.columns.push(ColumnDefinition {
                        identifier: definition.identifier,
                        name: definition.name.clone(),
                        column_type,
                        codepage: definition.pages_or_locale,
                        flags: definition.flags,
                        size: definition.space_usage,
                        default_value: definition.default_value.clone(),
                        date_time_repr: None,
                    });
                }
                CATALOG_TYPE_INDEX => table.indexes.push(IndexDefinition {
                    identifier: definition.identifier,
                    name: definition.name.clone(),
                    root_page: definition.coltyp_or_fdp,
                    flags: definition.flags,
                }),
                CATALOG_TYPE_LONG_VALUE => {
                    table.long_value_root = Some(definition.coltyp_or_fdp)
                }
                CATALOG_TYPE_CALLBACK => {}
                other => {
                    return Err(EseError::Unsupported(format!(
                        "Catalog definition type {} for {}",
                        other, definition.name
                    )))
                }
            }
        }

        let mut catalog = Catalog { tables };
        catalog.merge_templates()?;

        for table in &mut catalog.tables {
            table.columns.sort_by_key(|c| c.identifier);
            let mut seen = std::collections::HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.identifier) {
                    return Err(EseError::Format(format!(
                        "Table {} declares column id {} twice",
                        table.name, column.identifier
                    )));
                }
            }
        }

        Ok(catalog)
    }

    /// Fold template columns into derived tables.
    fn merge_templates(&mut self) -> Result<(), EseError> {
        let templates: std::collections::HashMap<String, Vec<ColumnDefinition>> = self
            .tables
            .iter()
            .map(|t| (t.name.clone(), t.columns.clone()))
            .collect();

        for table in &mut self.tables {
            let Some(template_name) = &table.template_name else {
                continue;
            };
            let Some(template_columns) = templates.get(template_name) else {
                return Err(EseError::Format(format!(
                    "Table {} names missing template {}",
                    table.name, template_name
                )));
            };
            for column in template_columns {
                if !table
                    .columns
                    .iter()
                    .any(|own| own.identifier == column.identifier)
                {
                    table.columns.push(column.clone());
                }
            }
        }
        Ok(())
    }

    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }
}

fn parse_definition(
    decoder: &RecordDecoder<'_>,
    columns: &[ColumnDefinition],
    decoded: &DecodedRecord,
) -> Result<CatalogDefinition, EseError> {
    let value = |index: usize| -> Result<Option<Value>, EseError> {
        match decoded.raw(index)? {
            Some(raw) => decoder.typed_value(&columns[index], raw).map(Some),
            None => Ok(None),
        }
    };

    let required_u32 = |index: usize, what: &str| -> Result<u32, EseError> {
        match value(index)? {
            Some(Value::Long(v)) => Ok(v as u32),
            Some(Value::UnsignedLong(v)) => Ok(v),
            other => Err(EseError::Format(format!(
                "Catalog field {} is {:?}",
                what, other
            ))),
        }
    };

    let father_data_page = required_u32(0, "ObjidTable")?;
    let definition_type = match value(1)? {
        Some(Value::Short(v)) => v as u16,
        other => {
            return Err(EseError::Format(format!(
                "Catalog field Type is {:?}",
                other
            )))
        }
    };
    let identifier = required_u32(2, "Id")?;
    let coltyp_or_fdp = required_u32(3, "ColtypOrPgnoFDP")?;
    let space_usage = required_u32(4, "SpaceUsage")?;
    let flags = value(5)?
        .map(|v| match v {
            Value::Long(v) => v as u32,
            _ => 0,
        })
        .unwrap_or(0);
    let pages_or_locale = value(6)?
        .map(|v| match v {
            Value::Long(v) => v as u32,
            _ => 0,
        })
        .unwrap_or(0);

    let name = match value(11)? {
        Some(Value::Text(name)) => name,
        other => {
            return Err(EseError::Format(format!(
                "Catalog definition without a name: {:?}",
                other
            )))
        }
    };
    let template_name = match value(13)? {
        Some(Value::Text(name)) if !name.is_empty() => Some(name),
        _ => None,
    };
    let default_value = match value(14)? {
        Some(Value::Binary(bytes)) if !bytes.is_empty() => Some(bytes),
        _ => None,
    };

    Ok(CatalogDefinition {
        father_data_page,
        definition_type,
        identifier,
        coltyp_or_fdp,
        space_usage,
        flags,
        pages_or_locale,
        name,
        template_name,
        default_value,
    })
}
