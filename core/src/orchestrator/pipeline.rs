use crate::executor::{Stage, StageSpec};

/// Ordered stages over a context type `C`.
pub struct Pipeline<C> {
    name: String,
    stages: Vec<Box<dyn Stage<C>>>,
}

impl<C> Pipeline<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage<O>(self, stage: StageSpec<C, O>) -> Self
    where
        O: Send + 'static,
    {
        self.boxed_stage(Box::new(stage))
    }

    pub fn boxed_stage(mut self, stage: Box<dyn Stage<C>>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Box<dyn Stage<C>>] {
        &self.stages
    }

    /// Step names in order; step `n` is `stage_names()[n - 1]`.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}
