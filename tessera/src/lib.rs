pub use tessera_engine::*;
pub use {
    tessera_dtype as dtype, tessera_engine as engine, tessera_error as error,
    tessera_program as program,
};
