use std::collections::BTreeSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use jsmirror_config::ResolverConfig;
use jsmirror_wire::{
    v8::{BacktraceFrame, FrameVariable},
    MessageChannel, SendMode,
};

use crate::{
    cache::HandleCache,
    error::{MirrorError, MirrorResult},
    resolver,
    state::Resolution,
    variable::Variable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverOptions {
    pub send_mode: SendMode,
    pub inline_refs: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            send_mode: SendMode::Sync,
            inline_refs: true,
        }
    }
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            send_mode: config.send_mode,
            inline_refs: config.inline_refs,
        }
    }
}

/// What every node of one suspension needs to resolve itself.
pub struct FrameContext {
    channel: Arc<dyn MessageChannel>,
    cache: Arc<HandleCache>,
    generation: u64,
    options: ResolverOptions,
}

impl FrameContext {
    /// Binds to the cache's current generation.
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        cache: Arc<HandleCache>,
        options: ResolverOptions,
    ) -> Arc<Self> {
        let generation = cache.generation();
        Arc::new(Self {
            channel,
            cache,
            generation,
            options,
        })
    }

    pub fn channel(&self) -> &dyn MessageChannel {
        self.channel.as_ref()
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    pub fn is_current(&self) -> bool {
        self.cache.generation() == self.generation
    }
}

/// One level of the suspended call stack and its top-level variables
/// (arguments first, then locals).
pub struct CallFrame {
    context: Arc<FrameContext>,
    index: u32,
    function_name: String,
    line: Option<u32>,
    column: Option<u32>,
    source_line: Option<String>,
    variables: Vec<Arc<Variable>>,
    variables_requested: AtomicBool,
}

impl CallFrame {
    pub(crate) fn new(
        context: Arc<FrameContext>,
        index: u32,
        function_name: String,
        bindings: &[FrameVariable],
    ) -> Self {
        let variables = bindings
            .iter()
            .filter(|binding| !resolver::is_hidden(&binding.name))
            .map(|binding| Variable::top_level(context.clone(), &binding.name, &binding.value))
            .collect();
        Self {
            context,
            index,
            function_name,
            line: None,
            column: None,
            source_line: None,
            variables,
            variables_requested: AtomicBool::new(false),
        }
    }

    pub(crate) fn from_backtrace(context: Arc<FrameContext>, frame: &BacktraceFrame) -> Self {
        let bindings: Vec<FrameVariable> = frame
            .arguments
            .iter()
            .chain(&frame.locals)
            .cloned()
            .collect();
        Self {
            line: frame.line,
            column: frame.column,
            source_line: frame.source_line.clone(),
            ..Self::new(context, frame.index, frame.function_name.clone(), &bindings)
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Zero-based line, as reported by the VM.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn column(&self) -> Option<u32> {
        self.column
    }

    pub fn source_line(&self) -> Option<&str> {
        self.source_line.as_deref()
    }

    pub fn variables(&self) -> &[Arc<Variable>] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<Arc<Variable>> {
        self.variables
            .iter()
            .find(|variable| variable.property_name() == name)
            .cloned()
    }

    pub fn is_valid(&self) -> bool {
        self.context.is_current()
    }

    /// Resolves top-level variables the VM reported by handle only, in one
    /// batch. Runs at most once per frame.
    pub fn ensure_variables(&self) -> MirrorResult<()> {
        if !self.is_valid() {
            return Err(MirrorError::StaleSuspension);
        }
        if self.variables_requested.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut awaited = Vec::new();
        let mut handles = BTreeSet::new();
        for variable in &self.variables {
            if variable.declared_type().is_some() || variable.resolution() != Resolution::Unresolved
            {
                continue;
            }
            let Some(handle) = variable.handle() else {
                continue;
            };
            match self.context.cache().get(handle) {
                Some(payload) => variable.fill(&payload),
                None => {
                    handles.insert(handle);
                    awaited.push((handle, Arc::downgrade(variable)));
                }
            }
        }

        if !handles.is_empty() {
            tracing::debug!(
                target: "jsmirror.resolve",
                frame = self.index,
                handles = handles.len(),
                "resolving frame variables"
            );
            resolver::request_batch(&self.context, handles, awaited, None);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFrame")
            .field("index", &self.index)
            .field("function_name", &self.function_name)
            .field("line", &self.line)
            .field("variables", &self.variables.len())
            .finish()
    }
}
