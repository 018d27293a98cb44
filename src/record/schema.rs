use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::error::TransactorError;
use crate::types::{FromValue, Value};

use super::Record;

pub(crate) type Getter<R> = Arc<dyn Fn(&R) -> Value + Send + Sync>;
pub(crate) type Setter<R> =
    Arc<dyn Fn(&mut R, Value) -> Result<(), TransactorError> + Send + Sync>;
type Alloc<R> = Arc<dyn Fn(&mut R) + Send + Sync>;

pub(crate) enum FieldDef<R> {
    Column {
        name: String,
        get: Getter<R>,
        set: Setter<R>,
    },
    Embedded {
        alloc: Option<Alloc<R>>,
        fields: Vec<FieldDef<R>>,
    },
    Skipped,
}

/// How an embedded record is reached from its parent.
enum Path<R, I> {
    Direct(fn(&R) -> &I, fn(&mut R) -> &mut I),
    Boxed(
        fn(&R) -> &Option<Box<I>>,
        fn(&mut R) -> &mut Option<Box<I>>,
        fn() -> I,
    ),
}

impl<R, I> Clone for Path<R, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, I> Copy for Path<R, I> {}

impl<R, I> Path<R, I> {
    fn get<'a>(&self, record: &'a R) -> Option<&'a I> {
        match self {
            Path::Direct(get, _) => Some(get(record)),
            Path::Boxed(get, _, _) => get(record).as_deref(),
        }
    }

    /// Borrow the embedded record mutably, allocating a boxed one if it is missing.
    fn get_mut<'a>(&self, record: &'a mut R) -> &'a mut I {
        match self {
            Path::Direct(_, get_mut) => get_mut(record),
            Path::Boxed(_, get_mut, make) => {
                &mut **get_mut(record).get_or_insert_with(|| Box::new(make()))
            }
        }
    }
}

fn lift<R: 'static, I: 'static>(field: FieldDef<I>, path: Path<R, I>) -> FieldDef<R> {
    match field {
        FieldDef::Column { name, get, set } => FieldDef::Column {
            name,
            get: Arc::new(move |record: &R| {
                path.get(record).map_or(Value::Null, |inner| get(inner))
            }),
            set: Arc::new(move |record: &mut R, value: Value| {
                set(path.get_mut(record), value)
            }),
        },
        FieldDef::Embedded { alloc, fields } => FieldDef::Embedded {
            alloc: alloc.map(|alloc| -> Alloc<R> {
                Arc::new(move |record: &mut R| alloc(path.get_mut(record)))
            }),
            fields: fields.into_iter().map(|f| lift(f, path)).collect(),
        },
        FieldDef::Skipped => FieldDef::Skipped,
    }
}

/// Collects a record's column declarations, in declaration order.
pub struct SchemaBuilder<R> {
    fields: Vec<FieldDef<R>>,
}

impl<R: 'static> SchemaBuilder<R> {
    fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Map column `name` to a field.
    pub fn column<T>(
        &mut self,
        name: &str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> &mut Self
    where
        T: Clone + Into<Value> + FromValue + 'static,
    {
        self.fields.push(FieldDef::Column {
            name: name.to_string(),
            get: Arc::new(move |record: &R| Into::<Value>::into(get(record).clone())),
            set: Arc::new(
                move |record: &mut R, value: Value| -> Result<(), TransactorError> {
                    *get_mut(record) = T::from_value(value)?;
                    Ok(())
                },
            ),
        });
        self
    }

    /// Flatten the columns of an embedded record into this one.
    ///
    /// Embedded columns never replace a column of the same name that is already mapped.
    pub fn embed<I: Record>(
        &mut self,
        get: fn(&R) -> &I,
        get_mut: fn(&mut R) -> &mut I,
    ) -> &mut Self {
        self.embed_path(Path::Direct(get, get_mut), None)
    }

    /// Like [`SchemaBuilder::embed`] for an optional boxed record.
    ///
    /// A missing record reads as `NULL` columns and is allocated with `Default` when a row is
    /// scanned into the parent.
    pub fn embed_boxed<I: Record + Default>(
        &mut self,
        get: fn(&R) -> &Option<Box<I>>,
        get_mut: fn(&mut R) -> &mut Option<Box<I>>,
    ) -> &mut Self {
        let path = Path::Boxed(get, get_mut, I::default);
        let alloc: Alloc<R> = Arc::new(move |record: &mut R| {
            path.get_mut(record);
        });
        self.embed_path(path, Some(alloc))
    }

    /// Record a field that is intentionally not mapped.
    pub fn skip(&mut self, _field: &str) -> &mut Self {
        self.fields.push(FieldDef::Skipped);
        self
    }

    fn embed_path<I: Record>(&mut self, path: Path<R, I>, alloc: Option<Alloc<R>>) -> &mut Self {
        let inner = SchemaBuilder::<I>::collect();
        self.fields.push(FieldDef::Embedded {
            alloc,
            fields: inner.into_iter().map(|f| lift(f, path)).collect(),
        });
        self
    }
}

impl<R: Record> SchemaBuilder<R> {
    fn collect() -> Vec<FieldDef<R>> {
        let mut builder = SchemaBuilder::new();
        R::describe(&mut builder);
        builder.fields
    }
}

/// Column name to accessor map for one precedence mode.
pub(crate) struct ColumnMap<R> {
    pub(crate) names: Vec<String>,
    index: HashMap<String, usize>,
    getters: Vec<Getter<R>>,
    setters: Vec<Setter<R>>,
}

impl<R> ColumnMap<R> {
    fn build(fields: &[FieldDef<R>], override_top: bool) -> Self {
        let mut map = ColumnMap {
            names: Vec::new(),
            index: HashMap::new(),
            getters: Vec::new(),
            setters: Vec::new(),
        };
        map.add_named(fields, override_top);
        map
    }

    fn add_named(&mut self, fields: &[FieldDef<R>], override_existing: bool) {
        for field in fields {
            match field {
                FieldDef::Column { name, get, set } => match self.index.get(name) {
                    Some(&idx) if override_existing => {
                        self.getters[idx] = Arc::clone(get);
                        self.setters[idx] = Arc::clone(set);
                    }
                    Some(_) => {}
                    None => {
                        self.index.insert(name.clone(), self.names.len());
                        self.names.push(name.clone());
                        self.getters.push(Arc::clone(get));
                        self.setters.push(Arc::clone(set));
                    }
                },
                // embedded names never displace an existing mapping
                FieldDef::Embedded { fields, .. } => self.add_named(fields, false),
                FieldDef::Skipped => {}
            }
        }
    }

    pub(crate) fn setter(&self, column: &str) -> Option<&Setter<R>> {
        self.index.get(column).map(|&idx| &self.setters[idx])
    }

    pub(crate) fn values(&self, record: &R) -> Vec<(String, Value)> {
        self.names
            .iter()
            .zip(&self.getters)
            .map(|(name, get)| (name.clone(), get(record)))
            .collect()
    }
}

/// The cached mapping for one record type.
pub(crate) struct RecordSchema<R> {
    allocs: Vec<Alloc<R>>,
    /// Outer declarations win over embedded ones.
    pub(crate) scan: ColumnMap<R>,
    /// First declaration wins.
    pub(crate) insert: ColumnMap<R>,
}

impl<R: Record> RecordSchema<R> {
    fn build() -> Self {
        let fields = SchemaBuilder::<R>::collect();
        let mut allocs = Vec::new();
        collect_allocs(&fields, &mut allocs);
        Self {
            allocs,
            scan: ColumnMap::build(&fields, true),
            insert: ColumnMap::build(&fields, false),
        }
    }

    /// Allocate every optional embedded record, outermost first.
    pub(crate) fn allocate(&self, record: &mut R) {
        for alloc in &self.allocs {
            alloc(record);
        }
    }
}

fn collect_allocs<R>(fields: &[FieldDef<R>], out: &mut Vec<Alloc<R>>) {
    for field in fields {
        if let FieldDef::Embedded { alloc, fields } = field {
            if let Some(alloc) = alloc {
                out.push(Arc::clone(alloc));
            }
            collect_allocs(fields, out);
        }
    }
}

type SchemaCache = LazyLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>;

static SCHEMAS: SchemaCache = LazyLock::new(|| Mutex::new(HashMap::new()));

/// The schema for `R`, built on first use and cached for the life of the process.
pub(crate) fn schema_for<R: Record>() -> Arc<RecordSchema<R>> {
    let id = TypeId::of::<R>();
    let cached = SCHEMAS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned();
    if let Some(hit) = cached
        && let Ok(schema) = hit.downcast::<RecordSchema<R>>()
    {
        return schema;
    }

    // built outside the lock: describe() may embed other records
    let built = Arc::new(RecordSchema::<R>::build());
    let entry = SCHEMAS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(id)
        .or_insert_with(|| Arc::clone(&built) as Arc<dyn Any + Send + Sync>)
        .clone();
    entry.downcast::<RecordSchema<R>>().unwrap_or(built)
}
