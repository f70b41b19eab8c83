//! Typed pipeline stages.
//!
//! A stage consumes one value and produces another. Stages are wired with
//! [`StageExt::then`], which only compiles when the output of one stage is
//! the input of the next, so the graph is checked at build time instead of
//! being resolved through named ports at run time.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::DomainError;

#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, DomainError>;
}

#[async_trait]
impl<S> Stage for Arc<S>
where
    S: Stage + ?Sized,
{
    type Input = S::Input;
    type Output = S::Output;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, DomainError> {
        (**self).run(input).await
    }
}

#[async_trait]
impl<S> Stage for Box<S>
where
    S: Stage + ?Sized,
{
    type Input = S::Input;
    type Output = S::Output;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, DomainError> {
        (**self).run(input).await
    }
}

/// Two stages run back to back. The first failure stops the chain.
pub struct Chain<A, B> {
    first: A,
    second: B,
}

#[async_trait]
impl<A, B> Stage for Chain<A, B>
where
    A: Stage,
    B: Stage<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, DomainError> {
        let mid = self.first.run(input).await?;
        self.second.run(mid).await
    }
}

pub trait StageExt: Stage + Sized {
    fn then<B>(self, next: B) -> Chain<Self, B>
    where
        B: Stage<Input = Self::Output>,
    {
        Chain {
            first: self,
            second: next,
        }
    }

    fn boxed(self) -> BoxStage<Self::Input, Self::Output>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<S: Stage + Sized> StageExt for S {}

pub type BoxStage<I, O> = Box<dyn Stage<Input = I, Output = O>>;
