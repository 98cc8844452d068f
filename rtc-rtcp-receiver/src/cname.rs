use std::collections::HashMap;

/// Canonical names announced by remote sources through SDES.
#[derive(Debug, Default)]
pub(crate) struct CnameTable {
    cnames: HashMap<u32, String>,
}

impl CnameTable {
    pub(crate) fn set(&mut self, ssrc: u32, cname: String) {
        self.cnames.insert(ssrc, cname);
    }

    pub(crate) fn get(&self, ssrc: u32) -> Option<&str> {
        self.cnames.get(&ssrc).map(String::as_str)
    }

    pub(crate) fn remove(&mut self, ssrc: u32) -> Option<String> {
        self.cnames.remove(&ssrc)
    }
}
