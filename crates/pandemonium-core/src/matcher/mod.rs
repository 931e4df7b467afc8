//! Boolean expressions deciding whether a process is an instance of a game.
//!
//! Evaluation happens in two phases:
//!
//! 1. [`MatcherChain::matches`] looks only at [`ProcessInfo`] (executable name
//!    and size), so it can run before a handle is opened.
//! 2. [`MatcherChain::is_compatible`] needs an open [`Process`] and checks
//!    modules and memory readability.
//!
//! A leaf that does not participate in a phase evaluates to `true` there.
//! Neither phase ever fails: memory probing errors fold into `false`.
//!
//! ## Example
//!
//! ```
//! use pandemonium_core::matcher;
//!
//! let chain = matcher::executable()
//!     .name("dxhr.exe")
//!     .and()
//!     .unwrap()
//!     .memory()
//!     .accessible("dxhr.exe", 0x1855950, 1)
//!     .and()
//!     .unwrap();
//! assert!(chain.to_string().starts_with("and("));
//! ```

mod builder;

use std::fmt;

use tracing::trace;

pub use builder::{ExecutableBuilder, MemoryBuilder, ModuleBuilder, executable, memory, module};

use crate::process::{Process, ProcessInfo};

/// A readable range that must exist for a process to be compatible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub module: String,
    pub offset: u64,
    pub length: usize,
}

/// Leaf predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Executable name (ignoring case) and/or exact on-disk size
    Executable {
        name: Option<String>,
        size: Option<u64>,
    },
    /// A loaded module by name and/or exact size
    Module {
        name: Option<String>,
        size: Option<u64>,
    },
    /// Every region is readable
    Memory { regions: Vec<MemoryRegion> },
}

impl Leaf {
    fn matches(&self, info: &ProcessInfo) -> bool {
        match self {
            Leaf::Executable { name, size } => {
                name.as_deref()
                    .is_none_or(|n| n.eq_ignore_ascii_case(&info.name))
                    && size.is_none_or(|s| s == info.executable_size)
            }
            Leaf::Module { .. } | Leaf::Memory { .. } => true,
        }
    }

    fn is_compatible(&self, process: &Process) -> bool {
        match self {
            Leaf::Executable { .. } => true,
            Leaf::Module { name, size } => process.modules().any(|m| {
                name.as_deref().is_none_or(|n| m.name().eq_ignore_ascii_case(n))
                    && size.is_none_or(|s| s == m.size())
            }),
            Leaf::Memory { regions } => regions.iter().all(|region| {
                let readable = process
                    .pointer(&region.module, region.offset, &[])
                    .and_then(|p| p.read_bytes(process, 0, region.length));
                match readable {
                    Ok(_) => true,
                    Err(e) => {
                        trace!(
                            "{}+{:#x} ({} bytes) is not readable: {}",
                            region.module, region.offset, region.length, e
                        );
                        false
                    }
                }
            }),
        }
    }
}

/// Immutable matcher expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherChain {
    True,
    False,
    Leaf(Leaf),
    And(Vec<MatcherChain>),
    Or(Vec<MatcherChain>),
    Xor(Box<MatcherChain>, Box<MatcherChain>),
    Not(Box<MatcherChain>),
}

impl MatcherChain {
    pub fn and(children: impl IntoIterator<Item = MatcherChain>) -> Self {
        MatcherChain::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = MatcherChain>) -> Self {
        MatcherChain::Or(children.into_iter().collect())
    }

    pub fn xor(a: MatcherChain, b: MatcherChain) -> Self {
        MatcherChain::Xor(Box::new(a), Box::new(b))
    }

    pub fn not(chain: MatcherChain) -> Self {
        MatcherChain::Not(Box::new(chain))
    }

    pub fn nand(children: impl IntoIterator<Item = MatcherChain>) -> Self {
        Self::not(Self::and(children))
    }

    pub fn nor(children: impl IntoIterator<Item = MatcherChain>) -> Self {
        Self::not(Self::or(children))
    }

    /// Continue building: the new leaf is and-ed with this chain.
    pub fn executable(self) -> ExecutableBuilder {
        ExecutableBuilder::with_parent(Some(self))
    }

    pub fn module(self) -> ModuleBuilder {
        ModuleBuilder::with_parent(Some(self))
    }

    pub fn memory(self) -> MemoryBuilder {
        MemoryBuilder::with_parent(Some(self))
    }

    /// Phase 1: metadata checks, usable without an open handle.
    pub fn matches(&self, info: &ProcessInfo) -> bool {
        self.evaluate(&|leaf| leaf.matches(info))
    }

    /// Phase 2: checks against an open process.
    pub fn is_compatible(&self, process: &Process) -> bool {
        self.evaluate(&|leaf| leaf.is_compatible(process))
    }

    /// Executable names this chain asks for, outside of negations.
    pub fn executables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_executables(&mut names);
        names
    }

    fn collect_executables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            MatcherChain::Leaf(Leaf::Executable {
                name: Some(name), ..
            }) => names.push(name),
            MatcherChain::And(children) | MatcherChain::Or(children) => {
                for child in children {
                    child.collect_executables(names);
                }
            }
            MatcherChain::Xor(a, b) => {
                a.collect_executables(names);
                b.collect_executables(names);
            }
            _ => {}
        }
    }

    fn evaluate(&self, leaf: &dyn Fn(&Leaf) -> bool) -> bool {
        match self {
            MatcherChain::True => true,
            MatcherChain::False => false,
            MatcherChain::Leaf(l) => leaf(l),
            // No short-circuiting
            MatcherChain::And(children) => children
                .iter()
                .map(|c| c.evaluate(leaf))
                .fold(true, |acc, r| acc && r),
            MatcherChain::Or(children) => children
                .iter()
                .map(|c| c.evaluate(leaf))
                .fold(false, |acc, r| acc || r),
            MatcherChain::Xor(a, b) => a.evaluate(leaf) != b.evaluate(leaf),
            MatcherChain::Not(chain) => !chain.evaluate(leaf),
        }
    }
}

impl Default for MatcherChain {
    fn default() -> Self {
        MatcherChain::True
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, children: &[&MatcherChain]) -> fmt::Result {
    write!(f, "{}(", op)?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, name, size) = match self {
            Leaf::Executable { name, size } => ("executable", name, size),
            Leaf::Module { name, size } => ("module", name, size),
            Leaf::Memory { regions } => {
                write!(f, "memory(")?;
                for (i, r) in regions.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}+{:#x}[{}]", r.module, r.offset, r.length)?;
                }
                return write!(f, ")");
            }
        };

        write!(f, "{}(", kind)?;
        if let Some(name) = name {
            write!(f, "name={}", name)?;
        }
        if let Some(size) = size {
            if name.is_some() {
                write!(f, ", ")?;
            }
            write!(f, "size={}", size)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for MatcherChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherChain::True => write!(f, "true"),
            MatcherChain::False => write!(f, "false"),
            MatcherChain::Leaf(leaf) => write!(f, "{}", leaf),
            MatcherChain::And(children) => write_list(f, "and", &children.iter().collect::<Vec<_>>()),
            MatcherChain::Or(children) => write_list(f, "or", &children.iter().collect::<Vec<_>>()),
            MatcherChain::Xor(a, b) => write_list(f, "xor", &[a.as_ref(), b.as_ref()]),
            MatcherChain::Not(chain) => write_list(f, "not", &[chain.as_ref()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessBuilder;
    use std::path::PathBuf;

    fn info(name: &str, size: u64) -> ProcessInfo {
        ProcessInfo {
            pid: 1,
            name: name.to_string(),
            executable_path: PathBuf::from(name),
            executable_size: size,
        }
    }

    fn exe(name: &str) -> MatcherChain {
        executable().name(name).and().unwrap()
    }

    #[test]
    fn test_executable_name_ignores_case() {
        let chain = exe("dxhr.exe");
        assert!(chain.matches(&info("DXHR.EXE", 0)));
        assert!(!chain.matches(&info("notepad.exe", 0)));
    }

    #[test]
    fn test_executable_size() {
        let chain = executable().name("game.exe").size(4096).and().unwrap();
        assert!(chain.matches(&info("game.exe", 4096)));
        assert!(!chain.matches(&info("game.exe", 4097)));

        let size_only = executable().size(10).and().unwrap();
        assert!(size_only.matches(&info("anything.exe", 10)));
    }

    #[test]
    fn test_and_matches_conjunction_of_leaves() {
        let leaves = [
            exe("a.exe"),
            exe("b.exe"),
            executable().size(1).and().unwrap(),
            module().name("x.dll").and().unwrap(),
        ];
        let candidates = [info("a.exe", 1), info("b.exe", 2), info("c.exe", 1)];

        for a in &leaves {
            for b in &leaves {
                let chain = MatcherChain::and([a.clone(), b.clone()]);
                for p in &candidates {
                    assert_eq!(chain.matches(p), a.matches(p) && b.matches(p));
                }
            }
        }
    }

    #[test]
    fn test_xor_of_same_leaf_is_false() {
        let leaves = [exe("a.exe"), module().name("x.dll").and().unwrap()];
        for leaf in leaves {
            let chain = MatcherChain::xor(leaf.clone(), leaf);
            assert!(!chain.matches(&info("a.exe", 0)));
            assert!(!chain.matches(&info("b.exe", 0)));
        }
    }

    #[test]
    fn test_combinators() {
        let p = info("a.exe", 0);
        let yes = exe("a.exe");
        let no = exe("b.exe");

        assert!(MatcherChain::or([no.clone(), yes.clone()]).matches(&p));
        assert!(!MatcherChain::or([no.clone(), no.clone()]).matches(&p));
        assert!(MatcherChain::xor(yes.clone(), no.clone()).matches(&p));
        assert!(MatcherChain::not(no.clone()).matches(&p));
        assert!(MatcherChain::nand([yes.clone(), no.clone()]).matches(&p));
        assert!(!MatcherChain::nand([yes.clone(), yes.clone()]).matches(&p));
        assert!(MatcherChain::nor([no.clone(), no]).matches(&p));
        assert!(!MatcherChain::nor([yes]).matches(&p));
    }

    #[test]
    fn test_identity_chains() {
        let p = info("a.exe", 0);
        assert!(MatcherChain::True.matches(&p));
        assert!(!MatcherChain::False.matches(&p));
        assert!(MatcherChain::and([]).matches(&p));
        assert!(!MatcherChain::or([]).matches(&p));
    }

    #[test]
    fn test_module_presence_and_size() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .module("engine.dll", 0x10000000, 0x2000)
            .build_open();

        assert!(module().name("ENGINE.dll").and().unwrap().is_compatible(&process));
        assert!(module().name("engine.dll").size(0x2000).and().unwrap().is_compatible(&process));
        assert!(!module().name("engine.dll").size(0x10).and().unwrap().is_compatible(&process));
        assert!(!module().name("missing.dll").and().unwrap().is_compatible(&process));
    }

    #[test]
    fn test_memory_probe_folds_errors_into_false() {
        let (process, mem) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build_open();

        let readable = memory_chain(0x10, 4);
        let out_of_range = memory_chain(0x0FFE, 4);
        let unmapped = memory_chain(0x10_0000, 1);
        let unknown_module = memory().accessible("other.dll", 0, 1).and().unwrap();

        assert!(readable.is_compatible(&process));
        assert!(!out_of_range.is_compatible(&process));
        assert!(!unmapped.is_compatible(&process));
        assert!(!unknown_module.is_compatible(&process));

        mem.kill();
        assert!(!readable.is_compatible(&process));
    }

    fn memory_chain(offset: u64, length: usize) -> MatcherChain {
        memory().accessible("game.exe", offset, length).and().unwrap()
    }

    #[test]
    fn test_memory_probe_on_closed_process_is_false() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build();
        assert!(!memory_chain(0, 1).is_compatible(&process));
    }

    #[test]
    fn test_phase_neutral_leaves() {
        let (process, _memory) = MockProcessBuilder::new(1, "other.exe")
            .module("other.exe", 0x400000, 0x1000)
            .build_open();

        // Executable leaves are only checked in phase 1
        assert!(exe("game.exe").is_compatible(&process));
        // Module and memory leaves are only checked in phase 2
        assert!(module().name("missing.dll").and().unwrap().matches(process.info()));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build_open();
        let chain = exe("game.exe")
            .memory()
            .accessible("game.exe", 0, 16)
            .and()
            .unwrap();

        for _ in 0..3 {
            assert!(chain.matches(process.info()));
            assert!(chain.is_compatible(&process));
        }
    }

    #[test]
    fn test_executables_skips_negated() {
        let chain = MatcherChain::and([
            exe("a.exe"),
            MatcherChain::or([exe("b.exe"), MatcherChain::not(exe("c.exe"))]),
        ]);
        assert_eq!(chain.executables(), vec!["a.exe", "b.exe"]);
    }

    #[test]
    fn test_display() {
        let chain = exe("dxhr.exe")
            .module()
            .name("d3d9.dll")
            .size(10)
            .and()
            .unwrap();
        assert_eq!(
            chain.to_string(),
            "and(executable(name=dxhr.exe), module(name=d3d9.dll, size=10))"
        );
        assert_eq!(
            MatcherChain::not(memory_chain(0x10, 4)).to_string(),
            "not(memory(game.exe+0x10[4]))"
        );
    }
}
