use super::{Leaf, MatcherChain, MemoryRegion};
use crate::error::{Error, Result};

/// Start an executable leaf.
pub fn executable() -> ExecutableBuilder {
    ExecutableBuilder::with_parent(None)
}

/// Start a module leaf.
pub fn module() -> ModuleBuilder {
    ModuleBuilder::with_parent(None)
}

/// Start a memory leaf.
pub fn memory() -> MemoryBuilder {
    MemoryBuilder::with_parent(None)
}

/// And the sealed leaf into the parent chain, flattening nested `And`s.
fn seal(parent: Option<MatcherChain>, leaf: Leaf) -> MatcherChain {
    let leaf = MatcherChain::Leaf(leaf);
    match parent {
        None => leaf,
        Some(MatcherChain::And(mut children)) => {
            children.push(leaf);
            MatcherChain::And(children)
        }
        Some(parent) => MatcherChain::And(vec![parent, leaf]),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutableBuilder {
    parent: Option<MatcherChain>,
    name: Option<String>,
    size: Option<u64>,
}

impl ExecutableBuilder {
    pub(super) fn with_parent(parent: Option<MatcherChain>) -> Self {
        Self {
            parent,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn and(self) -> Result<MatcherChain> {
        if self.name.is_none() && self.size.is_none() {
            return Err(Error::IncompleteMatcher(
                "executable matcher needs a name or a size",
            ));
        }
        Ok(seal(
            self.parent,
            Leaf::Executable {
                name: self.name,
                size: self.size,
            },
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    parent: Option<MatcherChain>,
    name: Option<String>,
    size: Option<u64>,
}

impl ModuleBuilder {
    pub(super) fn with_parent(parent: Option<MatcherChain>) -> Self {
        Self {
            parent,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn and(self) -> Result<MatcherChain> {
        if self.name.is_none() && self.size.is_none() {
            return Err(Error::IncompleteMatcher(
                "module matcher needs a name or a size",
            ));
        }
        Ok(seal(
            self.parent,
            Leaf::Module {
                name: self.name,
                size: self.size,
            },
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBuilder {
    parent: Option<MatcherChain>,
    regions: Vec<MemoryRegion>,
}

impl MemoryBuilder {
    pub(super) fn with_parent(parent: Option<MatcherChain>) -> Self {
        Self {
            parent,
            regions: Vec::new(),
        }
    }

    /// Require `length` bytes at `module + offset` to be readable.
    pub fn accessible(mut self, module: impl Into<String>, offset: u64, length: usize) -> Self {
        self.regions.push(MemoryRegion {
            module: module.into(),
            offset,
            length,
        });
        self
    }

    pub fn and(self) -> Result<MatcherChain> {
        if self.regions.is_empty() {
            return Err(Error::IncompleteMatcher(
                "memory matcher needs at least one address",
            ));
        }
        Ok(seal(
            self.parent,
            Leaf::Memory {
                regions: self.regions,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_builders_fail() {
        for err in [
            executable().and().unwrap_err(),
            module().and().unwrap_err(),
            memory().and().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn test_single_leaf_has_no_wrapper() {
        let chain = executable().name("game.exe").and().unwrap();
        assert!(matches!(chain, MatcherChain::Leaf(Leaf::Executable { .. })));
    }

    #[test]
    fn test_chaining_flattens_into_one_and() {
        let chain = executable()
            .name("game.exe")
            .and()
            .unwrap()
            .module()
            .name("engine.dll")
            .and()
            .unwrap()
            .memory()
            .accessible("engine.dll", 0x10, 4)
            .accessible("engine.dll", 0x20, 4)
            .and()
            .unwrap();

        let MatcherChain::And(children) = chain else {
            panic!("expected an and-chain");
        };
        assert_eq!(children.len(), 3);
        assert!(matches!(
            &children[2],
            MatcherChain::Leaf(Leaf::Memory { regions }) if regions.len() == 2
        ));
    }

    #[test]
    fn test_parent_or_is_kept_as_child() {
        let parent = MatcherChain::or([
            executable().name("a.exe").and().unwrap(),
            executable().name("b.exe").and().unwrap(),
        ]);
        let chain = parent.clone().module().name("x.dll").and().unwrap();
        assert_eq!(
            chain,
            MatcherChain::And(vec![
                parent,
                MatcherChain::Leaf(Leaf::Module {
                    name: Some("x.dll".into()),
                    size: None
                })
            ])
        );
    }
}
