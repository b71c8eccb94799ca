//! A unit of work shared between tasks.
//!
//! Every operation takes the same async lock, so saves, removes and loads
//! can never interleave with a flush in progress.

use crate::flush::FlushResult;
use crate::unit_of_work::{PendingCounts, UnitOfWork};
use asupersync::sync::Mutex;
use asupersync::{Cx, Outcome};
use docmodel_core::{AnyEntity, Document, Driver, Entity, EntityRef, Error, ObjectState, Result};
use std::sync::Arc;

/// Cloneable handle to a [`UnitOfWork`] behind an async mutex.
pub struct SharedUnitOfWork<D: Driver> {
    inner: Arc<Mutex<UnitOfWork<D>>>,
}

impl<D: Driver> SharedUnitOfWork<D> {
    pub fn new(uow: UnitOfWork<D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(uow)),
        }
    }

    pub fn inner(&self) -> &Arc<Mutex<UnitOfWork<D>>> {
        &self.inner
    }

    pub async fn save<M: Entity>(&self, cx: &Cx, object: &EntityRef<M>) -> Outcome<(), Error> {
        self.with(cx, |uow| uow.save(object)).await
    }

    pub async fn remove<M: Entity>(&self, cx: &Cx, object: &EntityRef<M>) -> Outcome<(), Error> {
        self.with(cx, |uow| uow.remove(object)).await
    }

    pub async fn detach<M: Entity>(&self, cx: &Cx, object: &EntityRef<M>) -> Outcome<(), Error> {
        self.with(cx, |uow| uow.detach(object)).await
    }

    pub async fn state<M: Entity>(
        &self,
        cx: &Cx,
        object: &EntityRef<M>,
    ) -> Outcome<ObjectState, Error> {
        self.with(cx, |uow| uow.state(object)).await
    }

    pub async fn load(
        &self,
        cx: &Cx,
        type_name: &str,
        document: Document,
    ) -> Outcome<AnyEntity, Error> {
        self.with(cx, |uow| uow.load(type_name, document)).await
    }

    pub async fn load_as<M: Entity>(
        &self,
        cx: &Cx,
        document: Document,
    ) -> Outcome<EntityRef<M>, Error> {
        self.with(cx, |uow| uow.load_as::<M>(document)).await
    }

    pub async fn pending_counts(&self, cx: &Cx) -> Outcome<PendingCounts, Error> {
        self.with(cx, |uow| Ok(uow.pending_counts())).await
    }

    /// Flush while holding the lock for the whole write.
    pub async fn flush(&self, cx: &Cx) -> Outcome<FlushResult, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let Ok(mut guard) = self.inner.lock(cx).await else {
            return Outcome::Err(Error::LockPoisoned("unit of work"));
        };
        guard.flush(cx).await
    }

    async fn with<T>(
        &self,
        cx: &Cx,
        op: impl FnOnce(&mut UnitOfWork<D>) -> Result<T>,
    ) -> Outcome<T, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let Ok(mut guard) = self.inner.lock(cx).await else {
            return Outcome::Err(Error::LockPoisoned("unit of work"));
        };
        match op(&mut *guard) {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Err(e),
        }
    }
}

impl<D: Driver> Clone for SharedUnitOfWork<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> std::fmt::Debug for SharedUnitOfWork<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedUnitOfWork")
            .field("inner", &"Arc<Mutex<UnitOfWork>>")
            .finish()
    }
}
