//! Query and search builders.
//!
//! Declarative builders for the structured-query and full-text-search
//! expressions understood by the remote API. The engine's MRU fetch path
//! uses [`SoqlBuilder`] to turn a recently-used id list into a query;
//! callers use both builders to construct targets.

/// Builder for structured queries.
///
/// ```
/// use soupsync_model::SoqlBuilder;
///
/// let query = SoqlBuilder::select(["Id", "Name"])
///     .from("Account")
///     .r#where("Name LIKE 'A%'")
///     .order_by("Name")
///     .limit(100)
///     .build();
/// assert_eq!(
///     query,
///     "SELECT Id, Name FROM Account WHERE Name LIKE 'A%' ORDER BY Name LIMIT 100"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SoqlBuilder {
    fields: Vec<String>,
    from: String,
    where_clause: Option<String>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl SoqlBuilder {
    /// Starts a query selecting the given fields.
    pub fn select(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the object type to query.
    pub fn from(mut self, object_type: impl Into<String>) -> Self {
        self.from = object_type.into();
        self
    }

    /// Sets the filter clause.
    pub fn r#where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Sets the grouping clause.
    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    /// Sets the ordering clause.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// Bounds the number of rows returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first rows of the result.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the query string.
    pub fn build(&self) -> String {
        let mut query = format!("SELECT {} FROM {}", self.fields.join(", "), self.from);
        if let Some(clause) = &self.where_clause {
            query.push_str(" WHERE ");
            query.push_str(clause);
        }
        if let Some(clause) = &self.group_by {
            query.push_str(" GROUP BY ");
            query.push_str(clause);
        }
        if let Some(clause) = &self.order_by {
            query.push_str(" ORDER BY ");
            query.push_str(clause);
        }
        if let Some(limit) = self.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            query.push_str(&format!(" OFFSET {offset}"));
        }
        query
    }
}

/// One object clause of a search's RETURNING section.
#[derive(Debug, Clone)]
pub struct SoslReturning {
    object_type: String,
    fields: Vec<String>,
    where_clause: Option<String>,
    limit: Option<u32>,
}

impl SoslReturning {
    /// Creates a returning clause for one object type.
    pub fn object(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            fields: Vec::new(),
            where_clause: None,
            limit: None,
        }
    }

    /// Sets the fields to return.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the filter clause.
    pub fn r#where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Bounds the number of rows returned for this object.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn render(&self) -> String {
        let mut spec = String::new();
        if let Some(limit) = self.limit {
            spec = format!(" LIMIT {limit}");
        }
        if let Some(clause) = &self.where_clause {
            spec = format!(" WHERE {clause}{spec}");
        }
        if self.fields.is_empty() && spec.is_empty() {
            return self.object_type.clone();
        }
        format!("{}({}{})", self.object_type, self.fields.join(", "), spec)
    }
}

/// Builder for full-text search expressions.
///
/// ```
/// use soupsync_model::{SoslBuilder, SoslReturning};
///
/// let search = SoslBuilder::find("Acme")
///     .returning(SoslReturning::object("Account").fields(["Id", "Name"]))
///     .build();
/// assert_eq!(search, "FIND {Acme} IN ALL FIELDS RETURNING Account(Id, Name)");
/// ```
#[derive(Debug, Clone)]
pub struct SoslBuilder {
    search_term: String,
    search_group: String,
    returning: Vec<SoslReturning>,
    limit: Option<u32>,
}

impl SoslBuilder {
    /// Starts a search for the given term.
    pub fn find(search_term: impl Into<String>) -> Self {
        Self {
            search_term: search_term.into(),
            search_group: "ALL FIELDS".into(),
            returning: Vec::new(),
            limit: None,
        }
    }

    /// Restricts the fields searched (e.g. `NAME FIELDS`).
    pub fn search_group(mut self, group: impl Into<String>) -> Self {
        self.search_group = group.into();
        self
    }

    /// Adds a RETURNING clause.
    pub fn returning(mut self, returning: SoslReturning) -> Self {
        self.returning.push(returning);
        self
    }

    /// Bounds the total number of rows returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the search string.
    pub fn build(&self) -> String {
        let mut search = format!("FIND {{{}}} IN {}", self.search_term, self.search_group);
        if !self.returning.is_empty() {
            let clauses: Vec<String> = self.returning.iter().map(SoslReturning::render).collect();
            search.push_str(" RETURNING ");
            search.push_str(&clauses.join(", "));
        }
        if let Some(limit) = self.limit {
            search.push_str(&format!(" LIMIT {limit}"));
        }
        search
    }
}
