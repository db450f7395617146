//! The lazy, memoized per-event computation graph (§4.1).

use std::any::Any;
use std::collections::HashMap;

use jana_types::EventIdentity;

use crate::error::{EngineError, EngineResult};

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
pub type CallbackResult = Result<(), CallbackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryStatus {
    Uninitialized,
    Unprocessed,
    Processed,
    Inserted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStatus {
    NotCreated,
    Created,
}

/// Identifies a factory slot: the output type's name plus an optional tag,
/// mirroring the original engine's (demangled type name, tag) lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactoryKey {
    pub type_name: &'static str,
    pub tag: String,
}

impl FactoryKey {
    pub fn new(type_name: &'static str, tag: impl Into<String>) -> Self {
        Self {
            type_name,
            tag: tag.into(),
        }
    }
}

/// A user-supplied lazy producer of a typed output collection.
///
/// The engine invokes `init`, `begin_run`/`change_run`/`end_run`, and
/// `process` in the strict order described in §4.1; user code never calls
/// these directly.
pub trait Factory: Send {
    type Output: Send + 'static;

    /// Tag distinguishing this factory from others producing the same type.
    fn tag(&self) -> &str {
        ""
    }

    /// If true, a factory left in `Inserted` status is cleared and
    /// reprocessed on next demand instead of being served as-is.
    fn regenerate(&self) -> bool {
        false
    }

    fn init(&mut self) -> CallbackResult {
        Ok(())
    }

    fn begin_run(&mut self, _event: &EventIdentity) -> CallbackResult {
        Ok(())
    }

    fn change_run(&mut self, _event: &EventIdentity) -> CallbackResult {
        Ok(())
    }

    fn end_run(&mut self) -> CallbackResult {
        Ok(())
    }

    fn process(&mut self, event: &EventIdentity) -> Result<Vec<Self::Output>, CallbackError>;
}

fn wrap(component: &str, callback: &str, source: CallbackError) -> EngineError {
    EngineError::CallbackException {
        component: component.to_string(),
        plugin: "embedder".to_string(),
        callback: callback.to_string(),
        source,
    }
}

/// Type-erased factory slot stored in a `FactorySet`.
trait AnyFactoryCell: Send {
    fn ensure_processed(&mut self, event: &EventIdentity) -> EngineResult<()>;
    fn clear_data(&mut self);
    fn insert_any(&mut self, objs: Box<dyn Any>);
    fn output_any(&self) -> &dyn Any;
    fn status(&self) -> FactoryStatus;
}

struct FactoryCell<F: Factory> {
    name: String,
    factory: F,
    status: FactoryStatus,
    creation_status: CreationStatus,
    previous_run_number: Option<u32>,
    output: Vec<F::Output>,
}

impl<F: Factory + 'static> AnyFactoryCell for FactoryCell<F> {
    fn ensure_processed(&mut self, event: &EventIdentity) -> EngineResult<()> {
        if self.status == FactoryStatus::Uninitialized {
            self.factory
                .init()
                .map_err(|e| wrap(&self.name, "init", e))?;
            self.status = FactoryStatus::Unprocessed;
        }

        if self.factory.regenerate() && self.status == FactoryStatus::Inserted {
            self.output.clear();
            self.status = FactoryStatus::Unprocessed;
        }

        if self.status == FactoryStatus::Unprocessed {
            match self.previous_run_number {
                None => {
                    self.factory
                        .change_run(event)
                        .map_err(|e| wrap(&self.name, "change_run", e))?;
                    self.factory
                        .begin_run(event)
                        .map_err(|e| wrap(&self.name, "begin_run", e))?;
                }
                Some(prev) if prev != event.run_number => {
                    self.factory
                        .end_run()
                        .map_err(|e| wrap(&self.name, "end_run", e))?;
                    self.factory
                        .change_run(event)
                        .map_err(|e| wrap(&self.name, "change_run", e))?;
                    self.factory
                        .begin_run(event)
                        .map_err(|e| wrap(&self.name, "begin_run", e))?;
                }
                _ => {}
            }
            self.previous_run_number = Some(event.run_number);

            self.output = self
                .factory
                .process(event)
                .map_err(|e| wrap(&self.name, "process", e))?;
            self.status = FactoryStatus::Processed;
            self.creation_status = CreationStatus::Created;
        }

        Ok(())
    }

    fn clear_data(&mut self) {
        self.output.clear();
        if self.status != FactoryStatus::Uninitialized {
            self.status = FactoryStatus::Unprocessed;
        }
        self.creation_status = CreationStatus::NotCreated;
    }

    fn insert_any(&mut self, objs: Box<dyn Any>) {
        if let Ok(v) = objs.downcast::<Vec<F::Output>>() {
            self.output = *v;
            self.status = FactoryStatus::Inserted;
            self.creation_status = CreationStatus::Created;
        }
    }

    fn output_any(&self) -> &dyn Any {
        &self.output
    }

    fn status(&self) -> FactoryStatus {
        self.status
    }
}

/// A fresh, never-inserted-into slot used when `Event::insert` is called for
/// a type with no registered factory.
struct InsertedCell<T: Send + 'static> {
    output: Vec<T>,
    status: FactoryStatus,
}

impl<T: Send + 'static> AnyFactoryCell for InsertedCell<T> {
    fn ensure_processed(&mut self, _event: &EventIdentity) -> EngineResult<()> {
        Ok(())
    }

    fn clear_data(&mut self) {
        self.output.clear();
        self.status = FactoryStatus::Unprocessed;
    }

    fn insert_any(&mut self, objs: Box<dyn Any>) {
        if let Ok(v) = objs.downcast::<Vec<T>>() {
            self.output = *v;
            self.status = FactoryStatus::Inserted;
        }
    }

    fn output_any(&self) -> &dyn Any {
        &self.output
    }

    fn status(&self) -> FactoryStatus {
        self.status
    }
}

/// `(type, tag) -> Factory` mapping owned by a single event slot.
#[derive(Default)]
pub struct FactorySet {
    cells: HashMap<FactoryKey, Box<dyn AnyFactoryCell>>,
}

impl FactorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F: Factory + 'static>(&mut self, name: impl Into<String>, factory: F) {
        let key = FactoryKey::new(std::any::type_name::<F::Output>(), factory.tag());
        self.cells.insert(
            key,
            Box::new(FactoryCell {
                name: name.into(),
                factory,
                status: FactoryStatus::Uninitialized,
                creation_status: CreationStatus::NotCreated,
                previous_run_number: None,
                output: Vec::new(),
            }),
        );
    }

    pub fn get<T: 'static>(&mut self, event: &EventIdentity, tag: &str) -> EngineResult<&[T]> {
        let key = FactoryKey::new(std::any::type_name::<T>(), tag);
        let cell = self
            .cells
            .get_mut(&key)
            .ok_or_else(|| EngineError::FactoryNotFound {
                type_name: std::any::type_name::<T>(),
                tag: tag.to_string(),
            })?;
        cell.ensure_processed(event)?;
        Ok(cell
            .output_any()
            .downcast_ref::<Vec<T>>()
            .expect("factory output type mismatch behind FactoryKey")
            .as_slice())
    }

    pub fn insert<T: Send + 'static>(&mut self, objs: Vec<T>, tag: &str) {
        let key = FactoryKey::new(std::any::type_name::<T>(), tag);
        self.cells
            .entry(key)
            .or_insert_with(|| {
                Box::new(InsertedCell::<T> {
                    output: Vec::new(),
                    status: FactoryStatus::Unprocessed,
                })
            })
            .insert_any(Box::new(objs));
    }

    pub fn status_of<T: 'static>(&self, tag: &str) -> Option<FactoryStatus> {
        let key = FactoryKey::new(std::any::type_name::<T>(), tag);
        self.cells.get(&key).map(|c| c.status())
    }

    /// Cascades `clear_data` across the whole factory set; called when an
    /// event is retired and returned to its pool.
    pub fn clear_all(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear_data();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingFactory {
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Factory for CountingFactory {
        type Output = i32;

        fn process(&mut self, event: &EventIdentity) -> Result<Vec<i32>, CallbackError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![event.event_number as i32])
        }
    }

    #[test]
    fn process_is_memoized_per_event() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut set = FactorySet::new();
        set.register(
            "Counting",
            CountingFactory {
                calls: calls.clone(),
            },
        );
        let id = EventIdentity::new(7, 1, jana_types::Level::PhysicsEvent);

        let first = set.get::<i32>(&id, "").unwrap().to_vec();
        let second = set.get::<i32>(&id, "").unwrap().to_vec();

        assert_eq!(first, vec![7]);
        assert_eq!(second, vec![7]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_factory_errors() {
        let mut set = FactorySet::new();
        let id = EventIdentity::new(1, 1, jana_types::Level::PhysicsEvent);
        let err = set.get::<i32>(&id, "").unwrap_err();
        assert!(matches!(err, EngineError::FactoryNotFound { .. }));
    }

    #[test]
    fn insert_bypasses_process() {
        let mut set = FactorySet::new();
        set.insert(vec![1, 2, 3], "manual");
        assert_eq!(
            set.status_of::<i32>("manual"),
            Some(FactoryStatus::Inserted)
        );
    }

    #[test]
    fn clear_all_resets_to_unprocessed() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut set = FactorySet::new();
        set.register(
            "Counting",
            CountingFactory {
                calls: calls.clone(),
            },
        );
        let id = EventIdentity::new(1, 1, jana_types::Level::PhysicsEvent);
        set.get::<i32>(&id, "").unwrap();
        set.clear_all();
        set.get::<i32>(&id, "").unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
