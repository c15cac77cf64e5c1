mod console;
mod logger;
