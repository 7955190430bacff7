//! Built-in prompt texts served verbatim to callers.

use std::str::FromStr;

use crate::api::middleware::AppError;
use crate::services::database::DatabaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPrompt {
    Analysis,
    SqlRules,
    React,
}

impl BuiltinPrompt {
    pub const ALL: [BuiltinPrompt; 3] = [BuiltinPrompt::Analysis, BuiltinPrompt::SqlRules, BuiltinPrompt::React];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinPrompt::Analysis => "analysis",
            BuiltinPrompt::SqlRules => "sql_rules",
            BuiltinPrompt::React => "react",
        }
    }

    /// Prompt text for `db_type`
    pub fn text(&self, db_type: DatabaseType) -> &'static str {
        match (db_type, self) {
            (DatabaseType::MySQL, BuiltinPrompt::Analysis) => MYSQL_ANALYSIS,
            (DatabaseType::MySQL, BuiltinPrompt::SqlRules) => MYSQL_SQL_RULES,
            (DatabaseType::MySQL, BuiltinPrompt::React) => MYSQL_REACT,
            (DatabaseType::PostgreSQL, BuiltinPrompt::Analysis) => PG_ANALYSIS,
            (DatabaseType::PostgreSQL, BuiltinPrompt::SqlRules) => PG_SQL_RULES,
            (DatabaseType::PostgreSQL, BuiltinPrompt::React) => PG_REACT,
        }
    }
}

impl FromStr for BuiltinPrompt {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|prompt| prompt.name() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown prompt name: {}", s)))
    }
}

const MYSQL_ANALYSIS: &str = r#"# 分析目标（MySQL）

仅进行结构化分析，不写 SQL。提取：
1) 相关表/视图（优先当前数据库）
2) 涉及字段与业务含义
3) 过滤条件 / 时间范围
4) 聚合 / 分组 / 排序

Output: 先中文，后英文要点。
"#;

const MYSQL_SQL_RULES: &str = r#"# SQL 规则（MySQL）

- 只写 **SELECT**；表名/字段名使用 **反引号**（如 `orders`.`order_id`）。
- 避免 `SELECT *`；明确列名。
- 明确 WHERE 条件与时间范围；必要时使用 `LIMIT`。
- 注意可用索引列，避免对索引列函数包裹。
- 连接请显式 ON 条件，避免笛卡尔积。
- 示例（中英）：
  ```sql
  SELECT `o`.`order_id`, `o`.`created_at`
  FROM `orders` AS `o`
  WHERE `o`.`status` = 'paid' AND `o`.`created_at` >= '2025-01-01'
  ORDER BY `o`.`created_at` DESC
  LIMIT 100;
  ```
"#;

const MYSQL_REACT: &str = r#"/no_think
你是 MySQL 数据库助手，须通过 MCP 工具获取数据，不得编造。
流程：思考→行动(get_all_schemas/get_tables/get_table_schema/execute_sql)→观察→迭代。
约束：只读（SELECT/WITH），必要时拆分查询。中文回答+英文一句总结。
"#;

const PG_ANALYSIS: &str = r#"# 分析目标（PostgreSQL）

仅进行结构化分析，不写 SQL。提取：
1) 相关 schema 与表/视图（注意 schema 限定）
2) 涉及字段与业务含义
3) 过滤条件 / 时间范围
4) 聚合 / 分组 / 排序

Output: 中文为主，附英文要点。
"#;

const PG_SQL_RULES: &str = r#"# SQL 规则（PostgreSQL）

- 只写 **SELECT**；表名/字段名使用 **双引号**，并带 schema（如 "public"."orders"）。
- 避免 `SELECT *`；明确列名。
- 时间与文本匹配可使用 `BETWEEN` / `ILIKE`；注意 `search_path` 影响。
- 优化：索引列不要函数包裹；必要时使用 CTE（WITH）。
- 示例（中英）：
  ```sql
  SELECT "o"."order_id", "o"."created_at"
  FROM "sales"."orders" AS "o"
  WHERE "o"."status" = 'paid' AND "o"."created_at" >= DATE '2025-01-01'
  ORDER BY "o"."created_at" DESC
  LIMIT 100;
  ```
"#;

const PG_REACT: &str = r#"/no_think
你是 PostgreSQL 数据库助手，须通过 MCP 工具获取数据，不得编造。
流程：思考→行动(get_all_schemas/get_tables/get_table_schema/execute_sql)→观察→迭代。
约束：只读（SELECT/WITH），中文回答+英文一句总结。
"#;
