use std::collections::HashMap;

use kiln::Location;
use log::trace;

/// Function-local name bindings with block-structured shadowing.
///
/// Each frame remembers what every name it binds used to resolve to, and
/// [`Scope::pop_frame`] puts those bindings back in reverse order, so a
/// shadowed name gets exactly its old location back and a fresh one is
/// removed.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Location>,
    frames: Vec<Vec<(String, Option<Location>)>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every binding; called on entry to each function.
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.frames.clear();
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (name, previous) in frame.into_iter().rev() {
            trace!("restoring binding of '{}'", name);
            match previous {
                Some(location) => {
                    self.bindings.insert(name, location);
                }
                None => {
                    self.bindings.remove(&name);
                }
            }
        }
    }

    /// Bind `name` in the innermost frame.
    pub fn bind(&mut self, name: &str, location: Location) {
        let previous = self.bindings.insert(name.to_string(), location);
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.to_string(), previous));
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Location> {
        self.bindings.get(name)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popping_restores_shadowed_bindings() {
        let mut scope = Scope::new();
        scope.push_frame();
        scope.bind("i", Location::Slot(0));

        scope.push_frame();
        scope.bind("i", Location::Slot(1));
        scope.bind("j", Location::Slot(2));
        assert_eq!(scope.lookup("i"), Some(&Location::Slot(1)));
        scope.pop_frame();

        assert_eq!(scope.lookup("i"), Some(&Location::Slot(0)));
        assert_eq!(scope.lookup("j"), None);
    }

    #[test]
    fn rebinding_in_one_frame_unwinds_fully() {
        let mut scope = Scope::new();
        scope.push_frame();
        scope.bind("a", Location::Slot(0));
        scope.bind("a", Location::Slot(1));
        scope.pop_frame();
        assert_eq!(scope.lookup("a"), None);
        assert_eq!(scope.depth(), 0);
    }
}
