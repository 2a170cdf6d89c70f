use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::Style;

/// Rounded table of string cells.
#[derive(Debug)]
pub(crate) struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn with_header<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.header);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn renders_rounded_grid() {
        let mut table = Table::with_header(["name", "address"]);
        table.push_row(vec!["WaWiCo".into(), "AA:BB:CC:DD:EE:FF".into()]);

        assert!(!table.is_empty());
        assert_snapshot!(table.to_string(), @r"
        ╭────────┬───────────────────╮
        │ name   │ address           │
        ├────────┼───────────────────┤
        │ WaWiCo │ AA:BB:CC:DD:EE:FF │
        ╰────────┴───────────────────╯
        ");
    }
}
