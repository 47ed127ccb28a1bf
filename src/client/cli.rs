// Browser a riga di comando sopra lo store
use std::io::Write;
use std::sync::Arc;

use log::debug;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::client::models::app_state::StoreState;
use crate::client::services::api_client::OperadorasApi;
use crate::client::services::error_handler::{ErrorDescriptor, ErrorHandler};
use crate::client::services::operadoras_store::{ActionOutcome, OperadorasStore};
use crate::client::utils::formatters::{
    format_currency, format_date, format_identifier, sort_by_field, ChartData, SortDirection,
};
use crate::common::models::{ExpenseDetail, OperatorDetail, OperatorRecord};

const NAME_WIDTH: usize = 40;

pub const HELP: &str = "\
Comandi:
  list [pagina]          carrega una pagina di operadoras
  next | prev            pagina successiva / precedente
  search <termo>         cerca per razão social o CNPJ (vuoto = torna alla lista)
  filter <termo>         filtra le righe già caricate (vuoto = nessun filtro)
  detail <cnpj>          storico spese di un'operadora
  operator <cnpj>        scheda completa di un'operadora
  regions                spese aggregate per UF
  stats                  statistiche generali
  sort <campo> [asc|desc] ordina la vista (es: sort razao_social desc)
  pagesize <n>           righe per pagina
  reset                  svuota lo stato
  errors                 errore corrente e precedente
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List(u32),
    Next,
    Prev,
    Search(String),
    Filter(String),
    Detail(String),
    Operator(String),
    Regions,
    Stats,
    Sort { field: String, direction: SortDirection },
    PageSize(u32),
    Reset,
    Errors,
    Help,
    Quit,
}

/// Parses one input line; `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let require = |what: &str| -> anyhow::Result<String> {
        if rest.is_empty() {
            Err(anyhow::anyhow!("'{}' richiede {}", name, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "list" | "ls" => {
            let page = if rest.is_empty() { 1 } else { rest.parse::<u32>()? };
            Command::List(page)
        }
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "search" | "s" => Command::Search(rest.to_string()),
        "filter" | "f" => Command::Filter(rest.to_string()),
        "detail" | "d" => Command::Detail(require("un CNPJ")?),
        "operator" | "op" => Command::Operator(require("un CNPJ")?),
        "regions" | "uf" => Command::Regions,
        "stats" => Command::Stats,
        "sort" => {
            let mut parts = rest.split_whitespace();
            let field = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("'sort' richiede un campo"))?
                .to_string();
            let direction = match parts.next() {
                Some(d) => d.parse::<SortDirection>()?,
                None => SortDirection::Asc,
            };
            Command::Sort { field, direction }
        }
        "pagesize" => Command::PageSize(require("un numero")?.parse::<u32>()?),
        "reset" => Command::Reset,
        "errors" => Command::Errors,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(anyhow::anyhow!("comando sconosciuto: {}", other)),
    };
    Ok(Some(command))
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

pub fn render_operator_row(op: &OperatorRecord) -> String {
    let amount = match &op.valor_despesas {
        Some(_) => format_currency(Some(op.expense_amount())),
        None => "-".to_string(),
    };
    format!(
        "{:<18}  {:<width$}  {:<2}  {:>20}",
        format_identifier(&op.cnpj),
        truncate(&op.razao_social, NAME_WIDTH),
        op.region_code(),
        amount,
        width = NAME_WIDTH
    )
}

/// The operator table plus a status line (page, search, filter).
pub fn render_listing(state: &StoreState, sort: Option<&(String, SortDirection)>) -> String {
    let rows: Vec<OperatorRecord> = state.filtered_operators().into_iter().cloned().collect();
    let rows = match sort {
        Some((field, direction)) => sort_by_field(&rows, field, *direction),
        None => rows,
    };

    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("(nessuna operadora)\n");
    }
    for op in &rows {
        out.push_str(&render_operator_row(op));
        out.push('\n');
    }

    if state.search.is_active {
        out.push_str(&format!(
            "Busca '{}': {} risultati",
            state.search.query,
            state.page.total_count()
        ));
    } else {
        out.push_str(&format!(
            "Pagina {}/{} ({} operadoras)",
            state.page.current_page(),
            state.total_pages(),
            state.page.total_count()
        ));
    }
    if !state.local_filter.is_empty() {
        out.push_str(&format!(" | filtro '{}': {} righe", state.local_filter, rows.len()));
    }
    out
}

pub fn render_error(error: &ErrorDescriptor) -> String {
    let mut out = format!("ERRORE [{}] {}", error.kind, error.message);
    if !error.details.is_empty() {
        out.push_str(&format!("\n  {}", error.details));
    }
    out
}

pub fn render_error_history(current: Option<&ErrorDescriptor>, previous: Option<&ErrorDescriptor>) -> String {
    let line = |label: &str, error: Option<&ErrorDescriptor>| match error {
        Some(e) => format!("{} ({}): {}", label, e.timestamp, render_error(e)),
        None => format!("{}: nessuno", label),
    };
    format!("{}\n{}", line("Corrente", current), line("Precedente", previous))
}

pub fn render_expense_detail(detail: &ExpenseDetail) -> String {
    let mut out = format!(
        "{} - {}\n",
        format_identifier(&detail.cnpj),
        detail.razao_social
    );
    if let Some(registro) = &detail.registro_ans {
        out.push_str(&format!("Registro ANS: {}\n", registro));
    }
    match (&detail.cidade, &detail.uf) {
        (Some(cidade), Some(uf)) => out.push_str(&format!("{} / {}\n", cidade, uf)),
        (None, Some(uf)) => out.push_str(&format!("{}\n", uf)),
        _ => {}
    }
    if detail.historico.is_empty() {
        out.push_str("Nessuna spesa registrata\n");
    }
    for entry in &detail.historico {
        out.push_str(&format!(
            "  {}T{}  {:>20}\n",
            entry.ano,
            entry.trimestre,
            format_currency(Some(entry.valor_despesas.value()))
        ));
    }
    out.push_str(&format!("Totale: {}", format_currency(Some(detail.total_expenses()))));
    out
}

pub fn render_operator_detail(detail: &OperatorDetail) -> String {
    let mut out = format!("{} - {}\n", format_identifier(&detail.cnpj), detail.razao_social);
    let fields = [
        ("Nome fantasia", &detail.nome_fantasia),
        ("Registro ANS", &detail.registro_ans),
        ("Modalidade", &detail.modalidade),
        ("Cidade", &detail.cidade),
        ("UF", &detail.uf),
        ("Telefone", &detail.telefone),
        ("E-mail", &detail.endereco_eletronico),
        ("Representante", &detail.representante),
    ];
    for (label, value) in fields {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(&format!("  {:<14} {}\n", label, v));
        }
    }
    if let Some(date) = detail.data_registro_ans {
        out.push_str(&format!("  {:<14} {}\n", "Registrata il", format_date(&date.to_string())));
    }
    out.trim_end().to_string()
}

pub fn render_chart(chart: &ChartData) -> String {
    if chart.labels.is_empty() {
        return "(nessun dato per UF)".to_string();
    }
    let max = chart.values().iter().copied().fold(0.0_f64, f64::max);
    chart
        .pairs()
        .map(|(uf, value)| {
            let bar = if max > 0.0 { ((value / max) * 30.0).round() as usize } else { 0 };
            format!("{:<2} {:<30} {}", uf, "#".repeat(bar), format_currency(Some(value)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn report(outcome: ActionOutcome, state: &StoreState) -> Option<String> {
    match outcome {
        ActionOutcome::Failed => state.error.as_ref().map(render_error),
        ActionOutcome::Discarded => Some("(risposta obsoleta ignorata)".to_string()),
        ActionOutcome::Applied => None,
    }
}

/// Ciclo interattivo: legge comandi da stdin finché non arriva `quit` o EOF.
pub async fn run<A: OperadorasApi + 'static>(store: Arc<OperadorasStore<A>>) -> anyhow::Result<()> {
    let mut events = store.subscribe().await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("store event: {:?}", event);
        }
    });

    println!("[CLI] Operadoras browser. Digita 'help' per i comandi.");
    let outcome = store.load_operators(1).await;
    let state = store.snapshot().await;
    match report(outcome, &state) {
        Some(msg) => println!("{}", msg),
        None => println!("{}", render_listing(&state, None)),
    }

    let mut input = BufReader::new(stdin());
    let mut line = String::new();
    let mut sort: Option<(String, SortDirection)> = None;
    // errori delle chiamate fatte fuori dallo store (operator, stats)
    let mut direct_errors = ErrorHandler::new();

    loop {
        line.clear();
        print!("> ");
        std::io::stdout().flush()?;
        if input.read_line(&mut line).await? == 0 {
            break;
        }

        let command = match parse_command(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                println!("[CLI] {}", e);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::List(page) => {
                let outcome = store.load_operators(page).await;
                print_listing(&store, outcome, sort.as_ref()).await;
            }
            Command::Next => match store.next_page().await {
                Some(outcome) => print_listing(&store, outcome, sort.as_ref()).await,
                None => println!("[CLI] Nessuna pagina successiva"),
            },
            Command::Prev => match store.previous_page().await {
                Some(outcome) => print_listing(&store, outcome, sort.as_ref()).await,
                None => println!("[CLI] Nessuna pagina precedente"),
            },
            Command::Search(term) => {
                let outcome = store.search_operators(&term).await;
                print_listing(&store, outcome, sort.as_ref()).await;
            }
            Command::Filter(term) => {
                store.set_local_filter(&term).await;
                println!("{}", render_listing(&store.snapshot().await, sort.as_ref()));
            }
            Command::Detail(cnpj) => {
                let outcome = store.load_expense_detail(&cnpj).await;
                let state = store.snapshot().await;
                match (report(outcome, &state), &state.expense_detail) {
                    (Some(msg), _) => println!("{}", msg),
                    (None, Some(detail)) => println!("{}", render_expense_detail(detail)),
                    (None, None) => {}
                }
            }
            Command::Operator(cnpj) => match store.api().get_operator(&cnpj).await {
                Ok(detail) => println!("{}", render_operator_detail(&detail)),
                Err(e) => {
                    if let Some(d) = direct_errors.set_error(Some(&e)) {
                        println!("{}", render_error(d));
                    }
                }
            },
            Command::Regions => {
                let outcome = store.load_region_expenses().await;
                let state = store.snapshot().await;
                if outcome == ActionOutcome::Failed {
                    println!("[CLI] Dati per UF non disponibili");
                }
                println!("{}", render_chart(&state.region_chart()));
            }
            Command::Stats => match store.api().statistics().await {
                Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                Err(e) => {
                    if let Some(d) = direct_errors.set_error(Some(&e)) {
                        println!("{}", render_error(d));
                    }
                }
            },
            Command::Sort { field, direction } => {
                sort = Some((field, direction));
                println!("{}", render_listing(&store.snapshot().await, sort.as_ref()));
            }
            Command::PageSize(n) => match store.set_page_size(n).await {
                Ok(()) => {
                    let outcome = store.load_operators(1).await;
                    print_listing(&store, outcome, sort.as_ref()).await;
                }
                Err(e) => println!("[CLI] {}", e),
            },
            Command::Errors => {
                let current = store.snapshot().await.error;
                let previous = store.previous_error().await;
                println!("{}", render_error_history(current.as_ref(), previous.as_ref()));
            }
            Command::Reset => {
                store.reset().await;
                sort = None;
                println!("[CLI] Stato azzerato");
            }
        }
    }

    println!("[CLI] Ciao!");
    Ok(())
}

async fn print_listing<A: OperadorasApi>(
    store: &OperadorasStore<A>,
    outcome: ActionOutcome,
    sort: Option<&(String, SortDirection)>,
) {
    let state = store.snapshot().await;
    if let Some(msg) = report(outcome, &state) {
        println!("{}", msg);
    }
    if outcome != ActionOutcome::Failed {
        println!("{}", render_listing(&state, sort));
    }
}
