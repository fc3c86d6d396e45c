use std::fmt;

/// Callbacks for one lifecycle point, invoked synchronously in
/// registration order.
pub struct Listeners<T: ?Sized> {
    callbacks: Vec<Box<dyn FnMut(&T)>>,
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add(&mut self, f: impl FnMut(&T) + 'static) {
        self.callbacks.push(Box::new(f));
    }

    pub fn emit(&mut self, arg: &T) {
        for cb in self.callbacks.iter_mut() {
            cb(arg);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn emits_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners: Listeners<u32> = Listeners::new();
        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            listeners.add(move |n| seen.borrow_mut().push(format!("{tag}:{n}")));
        }
        listeners.emit(&7);
        assert_eq!(*seen.borrow(), vec!["first:7", "second:7", "third:7"]);
        assert_eq!(listeners.len(), 3);
    }
}
