//! 数据集快照：表 / 列 / 行数 / 样例行，以及私有目录内的文件清单

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 某一时刻的数据集结构描述
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// 一张表（工作表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    /// 含表头行
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub sample_rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default)]
    pub dtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub bytes: u64,
}

/// 0 -> A, 25 -> Z, 26 -> AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

impl TableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.row_count <= 1 && self.sample_rows.is_empty()
    }

    pub fn describe(&self) -> String {
        if self.is_empty() {
            return format!("Table \"{}\" is empty.", self.name);
        }
        let headers = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let dtype = c.dtype.as_deref().unwrap_or("unknown");
                format!("{}({}): \"{}\" ({})", column_letter(i), i + 1, c.name, dtype)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!(
            "Table \"{}\" has {} rows (including the header row) and {} columns ({}).",
            self.name,
            self.row_count,
            self.columns.len(),
            headers
        );
        if !self.sample_rows.is_empty() {
            out.push_str(" Here is a table snapshot:\n");
            for row in &self.sample_rows {
                let cells: Vec<String> = row
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect();
                out.push_str("| ");
                out.push_str(&cells.join(" | "));
                out.push_str(" |\n");
            }
        }
        out
    }
}

impl DatasetSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// 渲染为推理端可读的文本
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.tables.iter().map(|t| t.describe()).collect();
        if !self.files.is_empty() {
            let files = self
                .files
                .iter()
                .map(|f| format!("{} ({} bytes)", f.path, f.bytes))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("Files in the working directory: {}.", files));
        }
        if parts.is_empty() {
            return "The dataset is empty.".to_string();
        }
        parts.join("\n")
    }

    /// 按表名 / 列名 / 样例行数投影（query_schema 使用）
    pub fn project(
        &self,
        table: Option<&str>,
        columns: Option<&[String]>,
        sample_rows: Option<usize>,
    ) -> Result<DatasetSnapshot, String> {
        let tables: Vec<&TableSnapshot> = match table {
            Some(name) => vec![self.table(name).ok_or_else(|| {
                let known: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
                format!("Unknown table '{}'. Available tables: {:?}", name, known)
            })?],
            None => self.tables.iter().collect(),
        };

        let mut projected = Vec::with_capacity(tables.len());
        for t in tables {
            let mut t = t.clone();
            if let Some(wanted) = columns {
                let indices: Vec<usize> = wanted
                    .iter()
                    .map(|w| {
                        t.columns.iter().position(|c| &c.name == w).ok_or_else(|| {
                            let known: Vec<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
                            format!(
                                "Unknown column '{}' in table '{}'. Available columns: {:?}",
                                w, t.name, known
                            )
                        })
                    })
                    .collect::<Result<_, _>>()?;
                t.columns = indices.iter().map(|&i| t.columns[i].clone()).collect();
                t.sample_rows = t
                    .sample_rows
                    .iter()
                    .map(|row| {
                        indices
                            .iter()
                            .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
            }
            if let Some(n) = sample_rows {
                t.sample_rows.truncate(n);
            }
            projected.push(t);
        }

        Ok(DatasetSnapshot {
            tables: projected,
            files: if table.is_some() { Vec::new() } else { self.files.clone() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> DatasetSnapshot {
        DatasetSnapshot {
            tables: vec![
                TableSnapshot {
                    name: "Sales".into(),
                    columns: vec![
                        ColumnInfo { name: "Region".into(), dtype: Some("str".into()) },
                        ColumnInfo { name: "Amount".into(), dtype: Some("int".into()) },
                    ],
                    row_count: 3,
                    sample_rows: vec![vec![json!("North"), json!(10)], vec![json!("South"), json!(7)]],
                },
                TableSnapshot {
                    name: "Empty".into(),
                    columns: vec![],
                    row_count: 1,
                    sample_rows: vec![],
                },
            ],
            files: vec![FileEntry { path: "data/book.xlsx".into(), bytes: 42 }],
        }
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn test_describe_mentions_headers_and_empty_tables() {
        let text = sales().describe();
        assert!(text.contains("Table \"Sales\" has 3 rows"));
        assert!(text.contains("A(1): \"Region\" (str)"));
        assert!(text.contains("| North | 10 |"));
        assert!(text.contains("Table \"Empty\" is empty."));
        assert!(text.contains("data/book.xlsx (42 bytes)"));
    }

    #[test]
    fn test_project_columns_and_rows() {
        let p = sales()
            .project(Some("Sales"), Some(&["Amount".to_string()]), Some(1))
            .unwrap();
        assert_eq!(p.tables.len(), 1);
        assert_eq!(p.tables[0].columns.len(), 1);
        assert_eq!(p.tables[0].sample_rows, vec![vec![json!(10)]]);
        assert!(p.files.is_empty());
    }

    #[test]
    fn test_project_unknown_table_is_error() {
        let err = sales().project(Some("Nope"), None, None).unwrap_err();
        assert!(err.contains("Sales"));
    }
}
