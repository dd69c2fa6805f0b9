use std::collections::HashSet;

use winnow::ascii::{multispace0, multispace1, Caseless};
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use acumen_types::AcumenError;

use crate::ast::AgentQuery;

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Skip whitespace, newlines included; clauses may sit on one line or many.
fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// An identifier: ASCII letter or underscore, then letters, digits, underscores.
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Clause keywords cannot double as stage or field names.
fn is_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("query")
        || word.eq_ignore_ascii_case("using")
        || word.eq_ignore_ascii_case("execute")
        || word.eq_ignore_ascii_case("return")
}

/// Intermediate representation of a parsed clause, before we merge them into an
/// AgentQuery. Offsets are remaining-input lengths at token start, so semantic
/// errors can point back into the source.
enum Clause {
    Query(String),
    Using(String),
    Execute(Vec<(String, usize)>),
    Return(Vec<String>),
}

/// Parse 'QUERY' identifier. The keyword matches case-insensitively.
fn query_clause(input: &mut &str) -> ModalResult<Clause> {
    let _ = literal(Caseless("query")).parse_next(input)?;
    let _ = multispace1.parse_next(input)?;
    let name = identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "query name identifier",
        )))
        .parse_next(input)?;
    if is_keyword(name) {
        return Err(make_cut_error("query name, not a clause keyword"));
    }
    Ok(Clause::Query(name.to_string()))
}

/// Parse 'USING' data_ref. A data_ref is any run of non-whitespace characters,
/// e.g. `dataset://tenant-42/transactions` or a file path.
fn using_clause(input: &mut &str) -> ModalResult<Clause> {
    let _ = literal(Caseless("using")).parse_next(input)?;
    let _ = multispace1.parse_next(input)?;
    let data_ref: &str = take_while(1.., |c: char| !c.is_whitespace())
        .context(StrContext::Expected(StrContextValue::Description(
            "data reference",
        )))
        .parse_next(input)?;
    if is_keyword(data_ref) {
        return Err(make_cut_error("data reference, not a clause keyword"));
    }
    Ok(Clause::Using(data_ref.to_string()))
}

/// Parse a single stage name within an EXECUTE chain. Names are normalized to
/// lowercase for registry lookup.
fn stage_name(input: &mut &str) -> ModalResult<String> {
    let name = identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "stage name",
        )))
        .parse_next(input)?;
    if is_keyword(name) {
        return Err(make_cut_error("stage name, not a clause keyword"));
    }
    Ok(name.to_ascii_lowercase())
}

/// Parse 'EXECUTE' stage ( '->' stage )*.
fn execute_clause(input: &mut &str) -> ModalResult<Clause> {
    let _ = literal(Caseless("execute")).parse_next(input)?;
    let _ = multispace1.parse_next(input)?;

    let mut stages = Vec::new();
    let at = input.len();
    let first = stage_name.parse_next(input)?;
    stages.push((first, at));

    loop {
        let _ = ws.parse_next(input)?;
        if opt(literal("->")).parse_next(input)?.is_some() {
            let _ = ws.parse_next(input)?;
            let at = input.len();
            let name = stage_name.parse_next(input)?;
            stages.push((name, at));
        } else {
            break;
        }
    }
    Ok(Clause::Execute(stages))
}

/// Parse a single return field name. Case is kept as written.
fn field_name(input: &mut &str) -> ModalResult<String> {
    let name = identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "return field name",
        )))
        .parse_next(input)?;
    if is_keyword(name) {
        return Err(make_cut_error("return field name, not a clause keyword"));
    }
    Ok(name.to_string())
}

/// Parse 'RETURN' field ( ',' field )*.
fn return_clause(input: &mut &str) -> ModalResult<Clause> {
    let _ = literal(Caseless("return")).parse_next(input)?;
    let _ = multispace1.parse_next(input)?;

    let first = field_name.parse_next(input)?;
    let mut fields = vec![first];
    loop {
        let _ = ws.parse_next(input)?;
        if opt(',').parse_next(input)?.is_some() {
            let _ = ws.parse_next(input)?;
            let f = field_name.parse_next(input)?;
            fields.push(f);
        } else {
            break;
        }
    }
    Ok(Clause::Return(fields))
}

/// Parse zero or more clauses in any order.
fn clauses(input: &mut &str) -> ModalResult<Vec<(usize, Clause)>> {
    let mut out = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        let at = input.len();
        let clause = alt((query_clause, using_clause, execute_clause, return_clause))
            .context(StrContext::Expected(StrContextValue::Description(
                "clause keyword (QUERY, USING, EXECUTE, RETURN)",
            )))
            .parse_next(input)?;
        out.push((at, clause));
    }
    Ok(out)
}

/// Merge parsed clauses into an AgentQuery, enforcing that each clause appears
/// exactly once and that no stage repeats within the EXECUTE chain.
fn merge_clauses(
    source: &str,
    total_len: usize,
    parsed: Vec<(usize, Clause)>,
) -> std::result::Result<AgentQuery, AcumenError> {
    let mut name: Option<String> = None;
    let mut data_ref: Option<String> = None;
    let mut staged: Option<Vec<(String, usize)>> = None;
    let mut return_fields: Option<Vec<String>> = None;

    for (at, clause) in parsed {
        match clause {
            Clause::Query(v) => {
                if name.is_some() {
                    return Err(duplicate_clause(source, total_len, at, "QUERY"));
                }
                name = Some(v);
            }
            Clause::Using(v) => {
                if data_ref.is_some() {
                    return Err(duplicate_clause(source, total_len, at, "USING"));
                }
                data_ref = Some(v);
            }
            Clause::Execute(v) => {
                if staged.is_some() {
                    return Err(duplicate_clause(source, total_len, at, "EXECUTE"));
                }
                staged = Some(v);
            }
            Clause::Return(v) => {
                if return_fields.is_some() {
                    return Err(duplicate_clause(source, total_len, at, "RETURN"));
                }
                return_fields = Some(v);
            }
        }
    }

    let name = name.ok_or_else(|| missing_clause("QUERY"))?;
    let data_ref = data_ref.ok_or_else(|| missing_clause("USING"))?;
    let staged = staged.ok_or_else(|| missing_clause("EXECUTE"))?;
    let return_fields = return_fields.ok_or_else(|| missing_clause("RETURN"))?;

    let mut seen = HashSet::new();
    let mut stages = Vec::with_capacity(staged.len());
    for (position, (stage, at)) in staged.into_iter().enumerate() {
        if !seen.insert(stage.clone()) {
            let (line, col) = offset_to_line_col(source, at, total_len);
            return Err(AcumenError::Parse {
                line,
                col,
                message: format!(
                    "duplicate stage '{}' at position {} in EXECUTE chain",
                    stage,
                    position + 1
                ),
                source_snippet: snippet_at(source, total_len - at),
            });
        }
        stages.push(stage);
    }

    Ok(AgentQuery {
        name,
        data_ref,
        stages,
        return_fields,
    })
}

fn duplicate_clause(
    source: &str,
    total_len: usize,
    remaining_len: usize,
    keyword: &str,
) -> AcumenError {
    let (line, col) = offset_to_line_col(source, remaining_len, total_len);
    AcumenError::Parse {
        line,
        col,
        message: format!("duplicate {} clause", keyword),
        source_snippet: snippet_at(source, total_len - remaining_len),
    }
}

fn missing_clause(keyword: &str) -> AcumenError {
    AcumenError::Parse {
        line: 1,
        col: 1,
        message: format!("missing {} clause", keyword),
        source_snippet: None,
    }
}

/// Compute (line, col) from the remaining input length at the error point.
fn offset_to_line_col(source: &str, remaining_len: usize, total_len: usize) -> (usize, usize) {
    let consumed = total_len - remaining_len;
    let prefix = &source[..consumed.min(source.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, col)
}

/// Extract a short source snippet starting at a byte offset.
fn snippet_at(source: &str, consumed: usize) -> Option<String> {
    let snippet: String = source[consumed.min(source.len())..]
        .chars()
        .take(40)
        .collect();
    if snippet.is_empty() {
        None
    } else {
        Some(snippet)
    }
}

/// Parse AgentQL text into an [`AgentQuery`].
pub fn parse(input: &str) -> std::result::Result<AgentQuery, AcumenError> {
    let mut remaining = input;
    let total_len = input.len();

    let parsed = clauses.parse_next(&mut remaining).map_err(|e| {
        let (line, col) = offset_to_line_col(input, remaining.len(), total_len);
        let message = format!("{}", e);

        // Carry the unconsumed text so the caller can show where parsing stopped.
        let snippet = remaining.chars().take(40).collect::<String>();
        let source_snippet = if snippet.is_empty() {
            None
        } else {
            Some(snippet)
        };

        AcumenError::Parse {
            line,
            col,
            message,
            source_snippet,
        }
    })?;

    let query = merge_clauses(input, total_len, parsed)?;
    tracing::debug!(
        query = %query.name,
        stages = query.stages.len(),
        "parsed AgentQL query"
    );
    Ok(query)
}
