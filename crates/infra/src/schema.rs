//! # スキーマ変更の SQL 生成
//!
//! テーブル定義と 1 件のスキーマ変更から、実行する SQL 文の列を生成する。
//!
//! ## 2 つの生成方式
//!
//! - **In-place**: `ALTER TABLE ... ALTER COLUMN` などで既存テーブルを直接変更する。
//!   クライアント・サーバー型のデータベース向け。
//! - **Batch**: 新しい形のテーブルを作り、行をコピーし、旧テーブルを削除して
//!   リネームする。列の変更・削除を直接サポートしない組み込み型データベース向け。
//!   ただし主キーを伴わない列追加は組み込み型でも直接実行できるため、
//!   batch 方式でも `ADD COLUMN` を使う。
//!
//! ```text
//! CREATE TABLE "_batch_tmp_users" (...新しい列定義...)
//! INSERT INTO "_batch_tmp_users" (...) SELECT ... FROM "users"
//! DROP TABLE "users"
//! ALTER TABLE "_batch_tmp_users" RENAME TO "users"
//! ```

use crate::{error::InfraError, migrate::MigrationMode};

/// batch 方式で作る一時テーブルの接頭辞
const BATCH_TMP_PREFIX: &str = "_batch_tmp_";

/// 列定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name:        String,
    pub sql_type:    String,
    pub nullable:    bool,
    pub primary_key: bool,
    pub default:     Option<String>,
}

impl ColumnDef {
    /// NULL 許容、主キーでない列
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            sql_type:    sql_type.into(),
            nullable:    true,
            primary_key: false,
            default:     None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// `DEFAULT` 句に書く SQL 式（例: `'active'`, `CURRENT_TIMESTAMP`）
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// テーブル定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name:    String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `CREATE TABLE` 文を生成する
    pub fn create_sql(&self) -> String {
        create_table_sql(&self.name, &self.columns)
    }

    /// 変更を適用した後のテーブル定義を返す
    ///
    /// 存在しない列の変更・削除、既存列名での追加はエラー。
    pub fn apply(&self, change: &SchemaChange) -> Result<TableDef, InfraError> {
        let mut columns = self.columns.clone();
        match change {
            SchemaChange::AddColumn(column) => {
                if self.column(&column.name).is_some() {
                    return Err(InfraError::invalid_schema_change(format!(
                        "列 {}.{} は既に存在します",
                        self.name, column.name
                    )));
                }
                columns.push(column.clone());
            }
            SchemaChange::DropColumn { name } => {
                self.require_column(name)?;
                columns.retain(|c| &c.name != name);
                if columns.is_empty() {
                    return Err(InfraError::invalid_schema_change(format!(
                        "テーブル {} の最後の列は削除できません",
                        self.name
                    )));
                }
            }
            SchemaChange::AlterColumn(column) => {
                self.require_column(&column.name)?;
                for c in columns.iter_mut().filter(|c| c.name == column.name) {
                    *c = column.clone();
                }
            }
            SchemaChange::RenameColumn { from, to } => {
                self.require_column(from)?;
                if self.column(to).is_some() {
                    return Err(InfraError::invalid_schema_change(format!(
                        "列 {}.{} は既に存在します",
                        self.name, to
                    )));
                }
                for c in columns.iter_mut().filter(|c| &c.name == from) {
                    c.name.clone_from(to);
                }
            }
        }
        Ok(TableDef::new(self.name.clone(), columns))
    }

    fn require_column(&self, name: &str) -> Result<&ColumnDef, InfraError> {
        self.column(name).ok_or_else(|| {
            InfraError::invalid_schema_change(format!("列 {}.{} は存在しません", self.name, name))
        })
    }
}

/// 1 件のスキーマ変更
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    AddColumn(ColumnDef),
    DropColumn { name: String },
    /// 同名の既存列を新しい定義（型・NULL 制約・デフォルト）に置き換える
    AlterColumn(ColumnDef),
    RenameColumn { from: String, to: String },
}

/// スキーマ変更を SQL 文の列に変換する
pub fn render(
    mode: MigrationMode,
    table: &TableDef,
    change: &SchemaChange,
) -> Result<Vec<String>, InfraError> {
    let altered = table.apply(change)?;

    match (mode, change) {
        (MigrationMode::Batch, SchemaChange::AddColumn(column)) if !column.primary_key => {
            Ok(render_in_place(table, change))
        }
        (MigrationMode::Batch, _) => Ok(render_table_copy(table, &altered, change)),
        (MigrationMode::InPlace, _) => Ok(render_in_place(table, change)),
    }
}

fn render_in_place(table: &TableDef, change: &SchemaChange) -> Vec<String> {
    let t = quote_ident(&table.name);
    match change {
        SchemaChange::AddColumn(column) => {
            vec![format!("ALTER TABLE {t} ADD COLUMN {}", column.to_sql())]
        }
        SchemaChange::DropColumn { name } => {
            vec![format!("ALTER TABLE {t} DROP COLUMN {}", quote_ident(name))]
        }
        SchemaChange::AlterColumn(column) => {
            let c = quote_ident(&column.name);
            let nullability = if column.nullable {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            let default = match &column.default {
                Some(expr) => format!("SET DEFAULT {expr}"),
                None => "DROP DEFAULT".to_string(),
            };
            vec![
                format!("ALTER TABLE {t} ALTER COLUMN {c} TYPE {}", column.sql_type),
                format!("ALTER TABLE {t} ALTER COLUMN {c} {nullability}"),
                format!("ALTER TABLE {t} ALTER COLUMN {c} {default}"),
            ]
        }
        SchemaChange::RenameColumn { from, to } => vec![format!(
            "ALTER TABLE {t} RENAME COLUMN {} TO {}",
            quote_ident(from),
            quote_ident(to)
        )],
    }
}

fn render_table_copy(table: &TableDef, altered: &TableDef, change: &SchemaChange) -> Vec<String> {
    let tmp_name = format!("{BATCH_TMP_PREFIX}{}", table.name);

    // 新テーブルの列と、値をコピーする旧テーブルの列の対応
    let (targets, sources): (Vec<String>, Vec<String>) = altered
        .columns
        .iter()
        .filter_map(|column| {
            let source = match change {
                SchemaChange::AddColumn(added) if added.name == column.name => return None,
                SchemaChange::RenameColumn { from, to } if *to == column.name => from.as_str(),
                _ => column.name.as_str(),
            };
            Some((quote_ident(&column.name), quote_ident(source)))
        })
        .unzip();

    vec![
        create_table_sql(&tmp_name, &altered.columns),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&tmp_name),
            targets.join(", "),
            sources.join(", "),
            quote_ident(&table.name)
        ),
        format!("DROP TABLE {}", quote_ident(&table.name)),
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&tmp_name),
            quote_ident(&table.name)
        ),
    ]
}

fn create_table_sql(name: &str, columns: &[ColumnDef]) -> String {
    let columns = columns
        .iter()
        .map(ColumnDef::to_sql)
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({columns})", quote_ident(name))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn users() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", "INTEGER").primary_key(),
                ColumnDef::new("email", "VARCHAR(255)").not_null(),
                ColumnDef::new("nickname", "VARCHAR(50)"),
            ],
        )
    }

    #[test]
    fn test_in_placeの列変更はalter_columnになる() {
        let change = SchemaChange::AlterColumn(ColumnDef::new("nickname", "TEXT").not_null());

        let sql = render(MigrationMode::InPlace, &users(), &change).unwrap();

        assert_eq!(sql, vec![
            r#"ALTER TABLE "users" ALTER COLUMN "nickname" TYPE TEXT"#.to_string(),
            r#"ALTER TABLE "users" ALTER COLUMN "nickname" SET NOT NULL"#.to_string(),
            r#"ALTER TABLE "users" ALTER COLUMN "nickname" DROP DEFAULT"#.to_string(),
        ]);
    }

    #[test]
    fn test_batchの列変更はテーブルコピーになる() {
        let change = SchemaChange::AlterColumn(ColumnDef::new("nickname", "TEXT").not_null());

        let sql = render(MigrationMode::Batch, &users(), &change).unwrap();

        assert_eq!(sql, vec![
            r#"CREATE TABLE "_batch_tmp_users" ("id" INTEGER PRIMARY KEY, "email" VARCHAR(255) NOT NULL, "nickname" TEXT NOT NULL)"#.to_string(),
            r#"INSERT INTO "_batch_tmp_users" ("id", "email", "nickname") SELECT "id", "email", "nickname" FROM "users""#.to_string(),
            r#"DROP TABLE "users""#.to_string(),
            r#"ALTER TABLE "_batch_tmp_users" RENAME TO "users""#.to_string(),
        ]);
    }

    #[test]
    fn test_batchのリネームは旧列名からコピーする() {
        let change = SchemaChange::RenameColumn {
            from: "nickname".to_string(),
            to:   "display_name".to_string(),
        };

        let sql = render(MigrationMode::Batch, &users(), &change).unwrap();

        assert_eq!(
            sql[1],
            r#"INSERT INTO "_batch_tmp_users" ("id", "email", "display_name") SELECT "id", "email", "nickname" FROM "users""#
        );
    }

    #[test]
    fn test_batchの列削除は残りの列だけをコピーする() {
        let change = SchemaChange::DropColumn {
            name: "nickname".to_string(),
        };

        let sql = render(MigrationMode::Batch, &users(), &change).unwrap();

        assert_eq!(
            sql[1],
            r#"INSERT INTO "_batch_tmp_users" ("id", "email") SELECT "id", "email" FROM "users""#
        );
    }

    #[test]
    fn test_batchでも主キーでない列追加はadd_columnのまま() {
        let change =
            SchemaChange::AddColumn(ColumnDef::new("status", "VARCHAR(20)").default_expr("'active'"));

        let sql = render(MigrationMode::Batch, &users(), &change).unwrap();

        assert_eq!(sql, vec![
            r#"ALTER TABLE "users" ADD COLUMN "status" VARCHAR(20) DEFAULT 'active'"#.to_string()
        ]);
    }

    #[test]
    fn test_存在しない列の変更はエラー() {
        let change = SchemaChange::DropColumn {
            name: "missing".to_string(),
        };

        assert!(render(MigrationMode::InPlace, &users(), &change).is_err());
    }

    #[test]
    fn test_既存列名での追加はエラー() {
        let change = SchemaChange::AddColumn(ColumnDef::new("email", "TEXT"));

        assert!(users().apply(&change).is_err());
    }

    #[test]
    fn test_識別子の二重引用符はエスケープされる() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
