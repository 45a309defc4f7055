//! Aggregates over the materialized expense and roster tables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use rust_decimal::Decimal;

use crate::camara::{ExpenseRecord, LegislatorSummary};

/// Label for expenses whose grouping attribute is absent.
pub const UNKNOWN: &str = "unknown";

/// A supplier as identified on reimbursement documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Supplier {
    pub name: String,
    pub tax_id: String,
}

impl Supplier {
    fn of(expense: &ExpenseRecord) -> Self {
        Self {
            name: label(expense.nome_fornecedor.as_deref()),
            tax_id: label(expense.cnpj_cpf_fornecedor.as_deref()),
        }
    }

    fn is_known(&self) -> bool {
        self.name != UNKNOWN || self.tax_id != UNKNOWN
    }
}

impl fmt::Display for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.tax_id)
    }
}

/// Totals over one expense table.
///
/// Documents without a value count towards `documents` and `missing_values`
/// but add nothing to any total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseSummary {
    pub total: Decimal,
    pub documents: usize,
    pub missing_values: usize,
    pub suppliers: usize,
    pub legislators: usize,
    /// Sorted by amount, largest first.
    pub by_type: Vec<(String, Decimal)>,
    /// Keyed by month number (1-12).
    pub by_month: BTreeMap<u32, Decimal>,
    /// Sorted by amount, largest first.
    pub by_party: Vec<(String, Decimal)>,
    /// Sorted by amount, largest first.
    pub by_state: Vec<(String, Decimal)>,
    /// Sorted by amount, largest first.
    pub by_legislator: Vec<(String, Decimal)>,
    /// Sorted by amount, largest first.
    pub by_supplier: Vec<(Supplier, Decimal)>,
    /// Supplier ranking within each expense type.
    pub suppliers_by_type: BTreeMap<String, Vec<(Supplier, Decimal)>>,
}

impl ExpenseSummary {
    /// Aggregate `expenses`, joining each document to `roster` on `id_deputado`.
    ///
    /// When the roster lists an id more than once, the last entry wins.
    #[must_use]
    pub fn from_records(expenses: &[ExpenseRecord], roster: &[LegislatorSummary]) -> Self {
        let legislators: HashMap<i64, &LegislatorSummary> =
            roster.iter().map(|l| (l.id, l)).collect();

        let mut total = Decimal::ZERO;
        let mut missing_values = 0;
        let mut spenders = HashSet::new();
        let mut by_type: HashMap<String, Decimal> = HashMap::new();
        let mut by_month: BTreeMap<u32, Decimal> = BTreeMap::new();
        let mut by_party: HashMap<String, Decimal> = HashMap::new();
        let mut by_state: HashMap<String, Decimal> = HashMap::new();
        let mut by_legislator: HashMap<String, Decimal> = HashMap::new();
        let mut by_supplier: HashMap<Supplier, Decimal> = HashMap::new();
        let mut suppliers_by_type: HashMap<String, HashMap<Supplier, Decimal>> = HashMap::new();

        for expense in expenses {
            let value = expense.valor_documento.unwrap_or_else(|| {
                missing_values += 1;
                Decimal::ZERO
            });
            total += value;
            spenders.insert(expense.id_deputado);

            let kind = label(expense.tipo_despesa.as_deref());
            let supplier = Supplier::of(expense);
            *suppliers_by_type
                .entry(kind.clone())
                .or_default()
                .entry(supplier.clone())
                .or_default() += value;
            *by_supplier.entry(supplier).or_default() += value;
            *by_type.entry(kind).or_default() += value;

            if let Some(month) = expense.mes.filter(|m| (1..=12).contains(m)) {
                *by_month.entry(month).or_default() += value;
            }

            let legislator = legislators.get(&expense.id_deputado);
            let party = legislator.and_then(|l| l.sigla_partido.as_deref());
            let state = legislator.and_then(|l| l.sigla_uf.as_deref());
            let name = legislator.map_or_else(
                || expense.id_deputado.to_string(),
                |l| l.nome.clone(),
            );

            *by_party.entry(label(party)).or_default() += value;
            *by_state.entry(label(state)).or_default() += value;
            *by_legislator.entry(name).or_default() += value;
        }

        Self {
            total,
            documents: expenses.len(),
            missing_values,
            suppliers: by_supplier.keys().filter(|s| s.is_known()).count(),
            legislators: spenders.len(),
            by_type: ranked(by_type),
            by_month,
            by_party: ranked(by_party),
            by_state: ranked(by_state),
            by_legislator: ranked(by_legislator),
            by_supplier: ranked(by_supplier),
            suppliers_by_type: suppliers_by_type
                .into_iter()
                .map(|(kind, totals)| (kind, ranked(totals)))
                .collect(),
        }
    }

    /// Supplier ranking for one expense type, empty when the type is unknown.
    #[must_use]
    pub fn suppliers_for_type(&self, expense_type: &str) -> &[(Supplier, Decimal)] {
        self.suppliers_by_type
            .get(expense_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Average value per valued document, zero when there are none.
    #[must_use]
    pub fn average_document(&self) -> Decimal {
        let valued = self.documents - self.missing_values;
        if valued == 0 {
            return Decimal::ZERO;
        }
        (self.total / Decimal::from(valued)).round_dp(2)
    }
}

fn label(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn ranked<K: Ord + Hash>(totals: HashMap<K, Decimal>) -> Vec<(K, Decimal)> {
    let mut ranked: Vec<_> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camara::Record;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn expense(id: i64, mes: u32, tipo: &str, cnpj: &str, valor: &str) -> ExpenseRecord {
        ExpenseRecord {
            id_deputado: id,
            ano: Some(2022),
            mes: Some(mes),
            tipo_despesa: Some(tipo.into()),
            data_documento: Some(format!("2022-{mes:02}-10")),
            valor_documento: Some(dec(valor)),
            url_documento: None,
            nome_fornecedor: Some(format!("Fornecedor {cnpj}")),
            cnpj_cpf_fornecedor: Some(cnpj.into()),
            extra: Record::new(),
        }
    }

    fn legislator(id: i64, nome: &str, partido: &str, uf: &str) -> LegislatorSummary {
        LegislatorSummary {
            id,
            uri: None,
            nome: nome.into(),
            sigla_partido: Some(partido.into()),
            uri_partido: None,
            sigla_uf: Some(uf.into()),
            id_legislatura: Some(56),
            url_foto: None,
            email: None,
            extra: Record::new(),
        }
    }

    fn supplier(name: &str, tax_id: &str) -> Supplier {
        Supplier {
            name: name.into(),
            tax_id: tax_id.into(),
        }
    }

    #[test]
    fn aggregates_by_dimension() {
        let expenses = vec![
            expense(1, 1, "COMBUSTÍVEIS E LUBRIFICANTES.", "111", "100.50"),
            expense(1, 2, "TELEFONIA", "222", "50.25"),
            expense(2, 1, "COMBUSTÍVEIS E LUBRIFICANTES.", "111", "200.00"),
            expense(3, 13, "", "", "10.00"),
        ];
        let roster = vec![
            legislator(1, "Ana", "PT", "SP"),
            legislator(2, "Bruno", "PL", "RJ"),
        ];

        let summary = ExpenseSummary::from_records(&expenses, &roster);

        assert_eq!(summary.total, dec("360.75"));
        assert_eq!(summary.documents, 4);
        assert_eq!(summary.suppliers, 3);
        assert_eq!(summary.legislators, 3);
        assert_eq!(
            summary.by_type[0],
            ("COMBUSTÍVEIS E LUBRIFICANTES.".to_string(), dec("300.50"))
        );
        assert_eq!(summary.by_month.get(&1), Some(&dec("300.50")));
        assert_eq!(summary.by_month.get(&2), Some(&dec("50.25")));
        assert!(!summary.by_month.contains_key(&13));
        assert_eq!(summary.by_party[0], ("PL".to_string(), dec("200")));
        assert!(summary
            .by_state
            .contains(&(UNKNOWN.to_string(), dec("10"))));
        assert_eq!(summary.by_legislator[1], ("Ana".to_string(), dec("150.75")));
        assert_eq!(summary.by_legislator[2], ("3".to_string(), dec("10")));
    }

    #[test]
    fn suppliers_are_ranked_by_name_and_tax_id() {
        let mut same_name_other_id = expense(2, 3, "TELEFONIA", "999", "70");
        same_name_other_id.nome_fornecedor = Some("Fornecedor 222".into());
        let expenses = vec![
            expense(1, 1, "COMBUSTÍVEIS E LUBRIFICANTES.", "111", "100"),
            expense(1, 2, "TELEFONIA", "222", "50"),
            expense(2, 2, "TELEFONIA", "222", "30"),
            expense(2, 1, "COMBUSTÍVEIS E LUBRIFICANTES.", "111", "5"),
            same_name_other_id,
        ];

        let summary = ExpenseSummary::from_records(&expenses, &[]);

        assert_eq!(
            summary.by_supplier,
            vec![
                (supplier("Fornecedor 111", "111"), dec("105")),
                (supplier("Fornecedor 222", "222"), dec("80")),
                (supplier("Fornecedor 222", "999"), dec("70")),
            ]
        );
        assert_eq!(
            summary.suppliers_for_type("TELEFONIA"),
            [
                (supplier("Fornecedor 222", "222"), dec("80")),
                (supplier("Fornecedor 222", "999"), dec("70")),
            ]
        );
        assert_eq!(
            summary.suppliers_for_type("COMBUSTÍVEIS E LUBRIFICANTES.").len(),
            1
        );
        assert!(summary.suppliers_for_type("PASSAGENS AÉREAS").is_empty());
        assert_eq!(summary.by_supplier[0].0.to_string(), "Fornecedor 111 (111)");
    }

    #[test]
    fn documents_without_value_add_nothing() {
        let mut unvalued = expense(1, 4, "TELEFONIA", "222", "0");
        unvalued.valor_documento = None;
        let expenses = vec![expense(1, 4, "TELEFONIA", "222", "30"), unvalued];

        let summary = ExpenseSummary::from_records(&expenses, &[]);

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.missing_values, 1);
        assert_eq!(summary.total, dec("30"));
        assert_eq!(summary.average_document(), dec("30"));
        assert_eq!(summary.by_month.get(&4), Some(&dec("30")));
    }

    #[test]
    fn last_roster_entry_wins() {
        let expenses = vec![expense(1, 3, "TELEFONIA", "1", "5")];
        let roster = vec![
            legislator(1, "Ana", "PSDB", "SP"),
            legislator(1, "Ana", "PSD", "SP"),
        ];
        let summary = ExpenseSummary::from_records(&expenses, &roster);
        assert_eq!(summary.by_party, vec![("PSD".to_string(), dec("5"))]);
    }

    #[test]
    fn empty_input() {
        let summary = ExpenseSummary::from_records(&[], &[]);
        assert_eq!(summary, ExpenseSummary::default());
        assert_eq!(summary.average_document(), Decimal::ZERO);
    }

    #[test]
    fn average_document_is_rounded() {
        let expenses = vec![
            expense(1, 1, "A", "1", "10"),
            expense(1, 1, "A", "1", "10"),
            expense(1, 1, "A", "1", "10.01"),
        ];
        let summary = ExpenseSummary::from_records(&expenses, &[]);
        assert_eq!(summary.average_document(), dec("10.00"));
    }
}
