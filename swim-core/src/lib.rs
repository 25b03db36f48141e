pub mod ext;
pub mod util;

#[cfg(test)]
mod test {
    use tracing::Level;

    use crate::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
