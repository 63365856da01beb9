pub mod kopis;
